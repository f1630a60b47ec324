pub use self::logger::*;
pub use self::writer::*;

pub mod logger;
pub mod writer;
