//! HTTP access to the remote document store

pub mod client;

pub use client::{
    DocumentStoreClient, FetchedFile, LoginData, LoginResponse, RegisterPayload, RemoteError,
    StatusResponse,
};
