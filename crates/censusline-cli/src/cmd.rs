pub mod pipeline;
pub mod tract;
pub mod usage;
pub mod zcta;
