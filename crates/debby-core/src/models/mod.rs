pub mod error;
pub mod manager;
pub mod package;

pub use error::{CoreError, CoreErrorKind};
pub use manager::{ManagerAction, ManagerDescriptor, ManagerId};
pub use package::{Package, PackageRef};
