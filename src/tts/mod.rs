//! Speech synthesis service boundary.

mod client;

pub use client::{
    HttpTransport, SpeechClient, SpeechRequest, SynthesisTransport, TransportError,
};
