//! Handler dependency graph utilities.

use std::any::TypeId;
use std::collections::HashMap;

use super::Handler;

/// Detect cycles in the handler dependency graph using Kahn's algorithm.
///
/// Returns `true` if the graph contains at least one cycle.
pub fn has_cycle(handlers: &[&dyn Handler]) -> bool {
    let type_to_idx: HashMap<TypeId, usize> = handlers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.handler_id(), i))
        .collect();

    let mut in_degree: Vec<usize> = handlers
        .iter()
        .map(|h| {
            h.dependencies()
                .iter()
                .filter(|d| type_to_idx.contains_key(d))
                .count()
        })
        .collect();

    let mut reverse_deps: Vec<Vec<usize>> = vec![Vec::new(); handlers.len()];
    for (i, h) in handlers.iter().enumerate() {
        for dep in h.dependencies() {
            if let Some(&dep_idx) = type_to_idx.get(dep)
                && let Some(rd) = reverse_deps.get_mut(dep_idx)
            {
                rd.push(i);
            }
        }
    }

    let mut queue: Vec<usize> = in_degree
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| if d == 0 { Some(i) } else { None })
        .collect();
    let mut processed = 0usize;

    while let Some(idx) = queue.pop() {
        processed += 1;
        if let Some(dependents) = reverse_deps.get(idx) {
            for &dep in dependents {
                if let Some(count) = in_degree.get_mut(dep) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push(dep);
                    }
                }
            }
        }
    }

    processed != handlers.len()
}

/// Dependencies that appear later in `handlers` than the handler that
/// needs them, as `(handler, dependency)` internal-name pairs.
///
/// Dependencies absent from the sequence are ignored: a filtered run may
/// legitimately leave them out.
pub fn order_violations<'a>(handlers: &[&'a dyn Handler]) -> Vec<(&'a str, &'a str)> {
    let position: HashMap<TypeId, usize> = handlers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.handler_id(), i))
        .collect();
    let mut violations = Vec::new();
    for (i, handler) in handlers.iter().enumerate() {
        for dep in handler.dependencies() {
            if let Some(&dep_idx) = position.get(dep)
                && dep_idx > i
                && let Some(dep_handler) = handlers.get(dep_idx)
            {
                violations.push((handler.internal_name(), dep_handler.internal_name()));
            }
        }
    }
    violations
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::{Category, RunConfig};
    use crate::handlers::HANDLERS;
    use crate::target::Target;
    use crate::template::Template;
    use crate::tokens::TokenContext;

    use anyhow::Result;

    // Mock handlers, each a distinct type so TypeId-based deps work.
    macro_rules! mock_handler {
        ($name:ident, $internal:expr, $deps:expr) => {
            struct $name;
            impl Handler for $name {
                fn name(&self) -> &str {
                    $internal
                }
                fn internal_name(&self) -> &str {
                    $internal
                }
                fn category(&self) -> Category {
                    Category::Fields
                }
                fn dependencies(&self) -> &[TypeId] {
                    const DEPS: &[TypeId] = $deps;
                    DEPS
                }
                fn will_apply(&self, _: &dyn Target, _: &Template, _: &RunConfig) -> Result<bool> {
                    Ok(true)
                }
                fn will_extract(&self, _: &dyn Target, _: &Template, _: &RunConfig) -> Result<bool> {
                    Ok(true)
                }
                fn apply(
                    &self,
                    _: &dyn Target,
                    _: &mut Template,
                    _: &mut TokenContext,
                    _: &RunConfig,
                ) -> Result<()> {
                    Ok(())
                }
                fn extract(&self, _: &dyn Target, _: &mut Template, _: &RunConfig) -> Result<()> {
                    Ok(())
                }
            }
        };
    }

    mock_handler!(HandA, "a", &[]);
    mock_handler!(HandB, "b", &[]);

    // Chain: DepA → DepB → DepC
    mock_handler!(DepA, "dep-a", &[]);
    mock_handler!(DepB, "dep-b", &[TypeId::of::<DepA>()]);
    mock_handler!(DepC, "dep-c", &[TypeId::of::<DepB>()]);

    // Cyclic: CycA → CycB → CycA
    mock_handler!(CycA, "cyc-a", &[TypeId::of::<CycB>()]);
    mock_handler!(CycB, "cyc-b", &[TypeId::of::<CycA>()]);

    #[test]
    fn no_cycle_independent_handlers() {
        let handlers: Vec<&dyn Handler> = vec![&HandA, &HandB];
        assert!(!has_cycle(&handlers));
    }

    #[test]
    fn no_cycle_linear_chain() {
        let handlers: Vec<&dyn Handler> = vec![&DepA, &DepB, &DepC];
        assert!(!has_cycle(&handlers));
    }

    #[test]
    fn cycle_detected() {
        let handlers: Vec<&dyn Handler> = vec![&CycA, &CycB];
        assert!(has_cycle(&handlers));
    }

    #[test]
    fn chain_in_order_has_no_violations() {
        let handlers: Vec<&dyn Handler> = vec![&DepA, &DepB, &DepC];
        assert!(order_violations(&handlers).is_empty());
    }

    #[test]
    fn reversed_chain_reports_violations() {
        let handlers: Vec<&dyn Handler> = vec![&DepC, &DepB, &DepA];
        assert_eq!(
            order_violations(&handlers),
            vec![("dep-c", "dep-b"), ("dep-b", "dep-a")]
        );
    }

    #[test]
    fn missing_dependency_is_not_a_violation() {
        let handlers: Vec<&dyn Handler> = vec![&DepC, &HandA];
        assert!(order_violations(&handlers).is_empty());
    }

    #[test]
    fn handler_table_is_a_valid_order() {
        assert!(!has_cycle(&HANDLERS));
        assert!(order_violations(&HANDLERS).is_empty());
    }

    #[test]
    fn handler_table_dependencies_are_resolvable() {
        use std::collections::HashSet;
        let present: HashSet<TypeId> = HANDLERS.iter().map(|h| h.handler_id()).collect();
        for handler in HANDLERS {
            for dep in handler.dependencies() {
                assert!(
                    present.contains(dep),
                    "handler '{}' depends on a TypeId not in the table",
                    handler.name()
                );
            }
        }
    }
}
