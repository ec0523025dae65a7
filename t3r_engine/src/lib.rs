pub mod logging;
pub mod t3r;
