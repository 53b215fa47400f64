pub mod calendar;
pub mod ocr;
pub mod pdf;
pub mod search;
pub mod summarizer;
pub mod time;
