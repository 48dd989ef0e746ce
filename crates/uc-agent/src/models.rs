//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - responses-style items and events, exchanged with callers of the agent
//! - chat-completions messages, tools and chunks, exchanged with the serving endpoint
//! - function descriptions and results, exchanged with the tool catalog
//!
//! We always immediately convert those data models into the internal structs
//! using to/from helpers, so the conversation loop only ever sees `Message`.
pub mod content;
pub mod message;
pub mod responses;
pub mod tool;
