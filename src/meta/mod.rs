//! Experimenters and groups

pub mod experimenter;
pub mod group;

pub use experimenter::ExperimenterWrapper;
pub use group::GroupWrapper;
