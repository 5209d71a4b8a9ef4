//! Pipeline stages behind a session.
//!
//! ```text
//! input ──▶ extract ──▶ (prompts) ──▶ llm
//!   │                                  ▲
//!   └──────────▶ encode ───────────────┘
//! ```
//!
//! 1. [`input`]   — read a manual from a path or URL, a photo from a path
//! 2. [`extract`] — pdfium text extraction; runs in `spawn_blocking`
//! 3. [`encode`]  — validate a photo and base64-wrap it for the model call
//! 4. [`llm`]     — bind the system instruction and call the remote model;
//!    the only stage with network I/O besides manual download

pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
