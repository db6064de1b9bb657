mod extract;
mod library;
mod progress;
mod reader;
