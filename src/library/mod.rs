pub mod client;

pub use client::{LibraryApi, LibraryClient, RemoteBook, Shelf};
