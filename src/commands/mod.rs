pub mod check;
pub mod status;
pub mod watch;
