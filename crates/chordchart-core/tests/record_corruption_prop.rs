use chordchart_core::{
    fixtures::demo_chart,
    load_chart,
    persistence::{decode_chart, load_record, save_record},
    serialize_chart,
};
use proptest::prelude::*;
use serde_json::Value;

fn demo_payload() -> Vec<u8> {
    let record = serialize_chart(&demo_chart()).expect("fixture chart should serialize");
    serde_json::to_vec_pretty(&record).expect("fixture record should encode")
}

fn decodes_without_panic(bytes: &[u8]) -> bool {
    std::panic::catch_unwind(|| {
        let _ = decode_chart(bytes);
    })
    .is_ok()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn random_record_bytes_do_not_panic(raw in prop::collection::vec(any::<u8>(), 0..4096)) {
        prop_assert!(decodes_without_panic(&raw));
    }

    #[test]
    fn truncated_records_do_not_panic(prefix_len in 0usize..4096usize) {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let path = temp.path().join("truncated.json");
        let record = serialize_chart(&demo_chart()).expect("fixture chart should serialize");
        save_record(&path, &record).expect("saving fixture record should work");

        let mut payload = std::fs::read(&path).expect("reading saved record should work");
        payload.truncate(prefix_len.min(payload.len()));
        std::fs::write(&path, payload).expect("writing truncated payload should work");

        let loaded = std::panic::catch_unwind(|| {
            if let Ok(record) = load_record(&path) {
                let _ = load_chart(record);
            }
        });
        prop_assert!(loaded.is_ok());
    }

    #[test]
    fn mutated_records_do_not_panic(index in 0usize..4096usize, delta in any::<u8>()) {
        let mut payload = demo_payload();
        let target = index % payload.len();
        payload[target] ^= delta.max(1);
        prop_assert!(decodes_without_panic(&payload));
    }

    #[test]
    fn mutated_sections_text_is_rejected_or_valid(index in 0usize..1024usize, delta in any::<u8>()) {
        let mut record = serialize_chart(&demo_chart()).expect("fixture chart should serialize");
        let Value::String(text) = &record.sections else {
            panic!("sections should be written as text");
        };
        let mut bytes = text.clone().into_bytes();
        let target = index % bytes.len();
        bytes[target] ^= delta.max(1);
        record.sections = Value::String(String::from_utf8_lossy(&bytes).into_owned());

        if let Ok(chart) = load_chart(record) {
            prop_assert!(chart.validate().is_ok());
        }
    }
}
