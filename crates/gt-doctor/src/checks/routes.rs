use crate::check::{Category, Check, CheckResult, CheckStatus};
use crate::checks::rigs_or_error;
use crate::context::CheckContext;
use crate::doctor::worst;
use crate::error::FixError;
use gt_core::town::MAYOR_DIR;
use gt_routing::{append_route, Route, RouteError, RouteTable};
use tracing::info;

/// `routes.jsonl` parses, has unique prefixes, and agrees with the registry.
pub struct RoutesCheck;

impl RoutesCheck {
    fn route_for(rig: &str, prefix: &str) -> Route {
        Route::new(format!("{prefix}-"), format!("{rig}/{MAYOR_DIR}/rig"))
    }
}

impl Check for RoutesCheck {
    fn name(&self) -> &'static str {
        "routes"
    }

    fn description(&self) -> &'static str {
        "Routing table covers every rig exactly once"
    }

    fn category(&self) -> Category {
        Category::Routing
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let rigs = match rigs_or_error(self, ctx) {
            Ok(rigs) => rigs,
            Err(result) => return result,
        };
        let routes_path = ctx.town.routes_path();
        let table = match RouteTable::load(&routes_path) {
            Ok(table) => table,
            Err(RouteError::Missing(path)) => {
                return CheckResult::error(self, format!("{} not found", path.display()))
                    .with_hint("run `gt-doctor fix` to add routes for registered rigs");
            }
            Err(err) => return CheckResult::error(self, err.to_string()),
        };

        let mut statuses = Vec::new();
        let mut details = Vec::new();
        for parse_error in table.errors() {
            statuses.push(CheckStatus::Warning);
            details.push(format!("line {}: {}", parse_error.line, parse_error.reason));
        }
        for prefix in table.duplicate_prefixes() {
            statuses.push(CheckStatus::Error);
            details.push(format!("prefix {prefix}- is routed more than once"));
        }

        let rig_map = table.rig_map();
        for rig in &rigs {
            let Some(prefix) = rig.prefix.as_deref() else {
                statuses.push(CheckStatus::Warning);
                details.push(format!("{}: no beads prefix in mayor/rigs.json", rig.name));
                continue;
            };
            match rig_map.get(prefix) {
                None => {
                    statuses.push(CheckStatus::Warning);
                    details.push(format!("{}: no route for prefix {prefix}-", rig.name));
                }
                Some(route) if route.rig_name != rig.name => {
                    statuses.push(CheckStatus::Error);
                    details.push(format!(
                        "{}: prefix {prefix}- is routed to {}",
                        rig.name, route.rig_name
                    ));
                }
                Some(_) => {}
            }
        }
        // Routes may legitimately point at rigs outside a --rig scope.
        if ctx.rig.is_none() {
            for (prefix, route) in &rig_map {
                if !ctx.town.rig_dir(&route.rig_name).is_dir() {
                    statuses.push(CheckStatus::Warning);
                    details.push(format!(
                        "route {prefix}- points at missing rig {}",
                        route.rig_name
                    ));
                }
            }
        }

        match worst(statuses) {
            CheckStatus::Ok => CheckResult::ok(
                self,
                format!("{} routes, all rigs routed", table.routes().len()),
            ),
            status => CheckResult::new(self, status, "routing table needs attention")
                .with_details(details)
                .with_hint("missing routes can be added with `gt-doctor fix`"),
        }
    }

    fn can_fix(&self) -> bool {
        true
    }

    fn fix(&self, ctx: &CheckContext<'_>) -> Result<(), FixError> {
        let rigs = ctx.rigs()?;
        let routes_path = ctx.town.routes_path();
        let table = match RouteTable::load(&routes_path) {
            Ok(table) => table,
            Err(RouteError::Missing(_)) => RouteTable::default(),
            Err(err) => return Err(err.into()),
        };
        let known = table.known_prefixes();
        let mut failures = Vec::new();
        for rig in &rigs {
            let Some(prefix) = rig.prefix.as_deref() else {
                continue;
            };
            if known.contains(prefix) {
                continue;
            }
            let route = Self::route_for(&rig.name, prefix);
            match append_route(&routes_path, &route) {
                Ok(()) => info!(event = "route_added", prefix = %route.prefix, path = %route.path),
                Err(err) => failures.push(format!("{}: {err}", rig.name)),
            }
        }
        FixError::collect(failures)
    }
}
