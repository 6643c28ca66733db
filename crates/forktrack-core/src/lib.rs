pub mod error;
pub mod ignore;
pub mod types;
