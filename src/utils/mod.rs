pub mod clock;
pub mod response;
