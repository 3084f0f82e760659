//! Property tests for path expressions and trails

use jenrich_format::{Limits, PathExpression, PathSegment, SearchExpression, Trail, TrailStep};
use proptest::prelude::*;

fn arb_step() -> impl Strategy<Value = TrailStep> {
    prop_oneof![
        "[a-zA-Z0-9_\\- .'\"\\[\\]\\\\$*]{1,8}".prop_map(TrailStep::Key),
        (0usize..1000).prop_map(TrailStep::Index),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn trail_display_parses_to_a_matching_path(steps in prop::collection::vec(arb_step(), 0..8)) {
        let trail = Trail::from(steps.clone());
        let path = PathExpression::parse_rooted(&trail.to_string()).unwrap();
        prop_assert!(path.matches_trail(&trail));
        prop_assert!(!path.has_wildcard());
        prop_assert_eq!(path.len(), steps.len());
    }

    #[test]
    fn wildcard_matches_any_step(step in arb_step(), prefix in "[a-z]{1,5}") {
        let path = PathExpression::parse(&format!("{}.*", prefix)).unwrap();
        let trail = Trail::from(vec![TrailStep::Key(prefix), step]);
        prop_assert!(path.matches_trail(&trail));
        prop_assert_eq!(path.segments()[1].clone(), PathSegment::Wildcard);
    }

    #[test]
    fn parser_never_panics(expression in "\\PC{0,40}") {
        let _ = PathExpression::parse(&expression);
        let _ = SearchExpression::parse(&expression);
    }

    #[test]
    fn segment_limit_is_enforced(count in 1usize..40, limit in 1usize..20) {
        let expression = format!("${}", ".a".repeat(count));
        let limits = Limits { max_path_segments: limit, ..Limits::default() };
        let result = PathExpression::parse_with_limits(&expression, &limits, true);
        prop_assert_eq!(result.is_ok(), count <= limit);
    }
}
