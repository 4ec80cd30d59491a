// Package model for the dist downloader
//
// Packages arrive already resolved; the downloader only reads their identity,
// versions and dist information.

mod dist;
#[allow(clippy::module_inception)]
mod package;

pub use dist::{expand_url_template, Dist, Mirror};
pub use package::Package;
