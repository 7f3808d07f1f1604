pub mod dependent;
pub mod proxy;
pub mod registry;
pub mod spec;

pub use dependent::{Cascade, DependentResolver, Resolution};
pub use proxy::{AssociationProxy, Member};
pub use registry::{AssociationRegistry, CascadeFactory};
pub use spec::{AssociationSpec, Dependent};
