use std::collections::BTreeMap;

use difsweep_core::{parse_int, AttrSpec, AttrTable, ConfigSource, ParamValue};
use proptest::prelude::*;

#[derive(Debug, Default)]
struct Opts {
    a: i64,
    b: i64,
    c: i64,
}

fn set_a(opts: &mut Opts, value: &ParamValue) {
    opts.a = value.expect_int();
}

fn set_b(opts: &mut Opts, value: &ParamValue) {
    opts.b = value.expect_int();
}

fn set_c(opts: &mut Opts, value: &ParamValue) {
    opts.c = value.expect_int();
}

const NAMES: [&str; 3] = ["a", "b", "c"];

fn table_for(lens: &[usize]) -> AttrTable<Opts> {
    let setters: [fn(&mut Opts, &ParamValue); 3] = [set_a, set_b, set_c];
    let mut entries = BTreeMap::new();
    for (idx, len) in lens.iter().enumerate() {
        let tokens: Vec<String> = (0..*len).map(|t| t.to_string()).collect();
        entries.insert(NAMES[idx].to_string(), tokens.join(" "));
    }
    let mut sections = BTreeMap::new();
    sections.insert("stage".to_string(), entries);
    let cfg = ConfigSource::from_sections(sections);
    let specs: Vec<AttrSpec<Opts>> = (0..lens.len())
        .map(|idx| AttrSpec {
            name: NAMES[idx],
            parse: parse_int,
            set: setters[idx],
        })
        .collect();
    AttrTable::from_config(&cfg, "stage", &specs).expect("table")
}

proptest! {
    #[test]
    fn product_count_shape_and_replay(lens in prop::collection::vec(0usize..4, 1..=3)) {
        let table = table_for(&lens);
        let expected: usize = lens.iter().product();
        prop_assert_eq!(table.combo_count(), expected);

        let first: Vec<_> = table.product().collect();
        let second: Vec<_> = table.product().collect();
        prop_assert_eq!(first.len(), expected);
        prop_assert_eq!(&first, &second);
        for combo in &first {
            prop_assert_eq!(combo.len(), lens.len());
        }
    }

    #[test]
    fn combo_at_agrees_with_iteration(lens in prop::collection::vec(1usize..4, 1..=3)) {
        let table = table_for(&lens);
        for (idx, combo) in table.product().enumerate() {
            prop_assert_eq!(table.combo_at(idx), combo);
        }
    }
}
