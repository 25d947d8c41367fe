mod train;

pub use train::training_loop;
