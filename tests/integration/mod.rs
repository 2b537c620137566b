//! Integration tests for the StoryForge job engine

mod dispatcher;
mod router;
mod sled_store;
mod validation;
