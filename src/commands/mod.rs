mod activate;
mod install;
mod list;
mod migrate;
mod paths;
mod uninstall;
mod verify;
mod vmid;

pub use activate::activate;
pub use install::{PackageArgs, install, link};
pub use list::{active, list};
pub use migrate::migrate;
pub use paths::paths;
pub use uninstall::uninstall;
pub use verify::verify;
pub use vmid::vmid;
