//! Core traits shared by every teardown primitive.

mod dispose;

pub use dispose::Dispose;
