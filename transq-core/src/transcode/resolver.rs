//! Capability resolution: picking the best registered element for a caps
//! string and role.

use crate::caps::Caps;
use crate::engine::{Element, ElementRole, MediaEngine, PipelineGraph};
use crate::error::{CoreError, CoreResult};

/// The element factory chosen for a mimetype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuitableElement {
    pub name: String,
    pub rank: u32,
}

/// Returns the highest ranked factory offering `role` whose output caps are
/// compatible with `mime_type`.
///
/// Equal ranks keep the factory enumerated first, so the result is
/// deterministic for a stable registry order.
pub fn find_best_element_for_mime_type(
    engine: &dyn MediaEngine,
    role: ElementRole,
    mime_type: &str,
) -> CoreResult<SuitableElement> {
    let wanted = Caps::parse(mime_type)?;

    let mut best: Option<SuitableElement> = None;
    for factory in engine.factories(role) {
        if !factory.produces(&wanted) {
            continue;
        }
        log::trace!("{} candidate for {}: {} (rank {})", role, mime_type, factory.name, factory.rank);
        if best.as_ref().is_none_or(|b| factory.rank > b.rank) {
            best = Some(SuitableElement {
                name: factory.name,
                rank: factory.rank,
            });
        }
    }

    best.ok_or_else(|| CoreError::NoSuitableElement {
        role,
        mime_type: mime_type.to_string(),
    })
}

/// Resolves the best factory for `mime_type`, instantiates it as `name` and
/// adds it to `graph`.
pub fn create_element_for_mime_type(
    engine: &dyn MediaEngine,
    role: ElementRole,
    mime_type: &str,
    graph: &mut PipelineGraph,
    name: &str,
) -> CoreResult<Element> {
    let best = find_best_element_for_mime_type(engine, role, mime_type)?;
    log::debug!("Using {} '{}' (rank {}) for {}", role, best.name, best.rank, mime_type);

    let element = engine.make_element(&best.name, name)?;
    graph.add(element.clone())?;
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mocks::MockEngine;
    use crate::engine::RANK_PRIMARY;

    #[test]
    fn higher_rank_wins_regardless_of_order() {
        let engine = MockEngine::new();
        engine.add_factory("nine", ElementRole::Encoder, &["audio/x-foo"], 9).unwrap();
        engine.add_factory("five", ElementRole::Encoder, &["audio/x-foo"], 5).unwrap();

        let best = find_best_element_for_mime_type(&engine, ElementRole::Encoder, "audio/x-foo").unwrap();
        assert_eq!(best, SuitableElement { name: "nine".to_string(), rank: 9 });
    }

    #[test]
    fn ties_keep_first_enumerated() {
        let engine = MockEngine::new();
        engine.add_factory("first", ElementRole::Muxer, &["application/ogg"], 7).unwrap();
        engine.add_factory("second", ElementRole::Muxer, &["application/ogg"], 7).unwrap();

        let best = find_best_element_for_mime_type(&engine, ElementRole::Muxer, "application/ogg").unwrap();
        assert_eq!(best.name, "first");
    }

    #[test]
    fn role_and_caps_both_filter() {
        let engine = MockEngine::new();
        engine.add_factory("oggmux", ElementRole::Muxer, &["audio/x-foo"], RANK_PRIMARY).unwrap();
        engine.add_factory("barenc", ElementRole::Encoder, &["audio/x-bar"], RANK_PRIMARY).unwrap();

        let err = find_best_element_for_mime_type(&engine, ElementRole::Encoder, "audio/x-foo").unwrap_err();
        assert!(err.is_construction_failure());
        assert_eq!(err.to_string(), "No encoder found for audio/x-foo");
    }

    #[test]
    fn instantiation_failure_is_a_construction_failure() {
        let engine = MockEngine::new();
        engine.add_factory("fooenc", ElementRole::Encoder, &["audio/x-foo"], 1).unwrap();
        engine.break_factory("fooenc");

        let mut graph = PipelineGraph::new("t");
        let err = create_element_for_mime_type(&engine, ElementRole::Encoder, "audio/x-foo", &mut graph, "encoder")
            .unwrap_err();
        assert!(err.is_construction_failure());
        assert!(graph.elements().is_empty());
    }
}
