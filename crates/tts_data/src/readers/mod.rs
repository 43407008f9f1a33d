pub mod npy;

pub use npy::read_npy;
