#[cfg(feature = "default-stack")]
mod callcc;
