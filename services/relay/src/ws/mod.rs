pub mod session;
pub mod turns;
