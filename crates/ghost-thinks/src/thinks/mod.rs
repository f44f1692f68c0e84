pub mod helloworld;
pub mod scripted;
