pub mod handler;

pub use handler::MiniBlogService;
