//! Tutor facade and its builder

mod builder;
mod tutor;

pub use builder::TutorBuilder;
pub use tutor::Tutor;
