pub mod iter;

pub use iter::from_iter;
