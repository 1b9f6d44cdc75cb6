pub mod gemini;
pub mod pexels;
pub mod pixabay;
pub mod tts;
pub mod youtube;
