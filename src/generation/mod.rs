pub mod client;
pub mod job;
pub mod manager;
pub mod prompt;

pub use client::{canonical_status, CreditsInfo, GenerationClient, MusicService, TrackResponse};
pub use job::{JobStatus, Track, TrackUpdate};
pub use manager::{GenerationManager, SubmitRequest};
pub use prompt::{build_prompt, derive_tags, resolve_style, target_bpm, Style, WalkShape};
