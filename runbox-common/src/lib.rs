#[cfg(feature = "elapsed")]
pub mod elapsed;

#[cfg(feature = "sandbox_summary")]
pub mod sandbox_summary;
