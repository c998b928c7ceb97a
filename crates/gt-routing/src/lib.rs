//! Where a record lives: the prefix routing table and the per-worktree
//! redirect chain.

pub mod redirect;
pub mod routes;

pub use redirect::{
    canonical_target, repair, repair_for_rig, resolve, resolve_store, BrokenReason, Hop,
    RedirectError, Resolution, StoreStatus, Target, MAX_HOPS,
};
pub use routes::{append_route, RigRoute, Route, RouteError, RouteParseError, RouteTable};
