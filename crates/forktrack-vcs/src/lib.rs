pub mod adapter;
pub mod git2_adapter;

pub use adapter::VcsAdapter;
pub use git2_adapter::Git2Adapter;
