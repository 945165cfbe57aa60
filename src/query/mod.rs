//! Query layer: boundary parameters, predicate augmenters, and the staged
//! builder that turns them into an executable store query.

pub mod augment;
pub mod builder;
pub mod raw;
