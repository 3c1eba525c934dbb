//! Generation layer - the collaborator that produces each participant's reply
//!
//! This module provides:
//! - Request and output types plus the Generator trait
//! - OpenAiGenerator for OpenAI-compatible endpoints
//! - MockGenerator for tests and offline runs
//! - Accumulation of complete and streamed output into final text

pub mod generator;
pub mod mock;
pub mod openai;
pub mod streaming;

pub use generator::{FragmentStream, GenerationOutput, GenerationRequest, Generator, PromptMessage};
pub use mock::{MockGenerator, MockReply};
pub use openai::{OpenAiConfig, OpenAiGenerator};
pub use streaming::{Fragment, accumulate, complete_text, parse_fragment};
