pub mod bundles;
pub mod components;
pub mod dispatch;
