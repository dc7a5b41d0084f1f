pub mod aggregate;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod generator;
pub mod models;
pub mod report;

pub use error::{DataError, Result};
pub use generator::Generator;
pub use models::{Field, FieldType, Matrix, Record, Schema, Table, Value};
