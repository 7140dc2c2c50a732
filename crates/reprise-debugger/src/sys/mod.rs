mod windows;

pub use self::windows::*;
