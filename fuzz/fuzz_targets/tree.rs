#![no_main]

use libfuzzer_sys::fuzz_target;
use luaubox::frontend::{parse_to_tree, TreeResult};

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    match parse_to_tree(source) {
        Ok(TreeResult::Tree(tree)) => {
            assert!(serde_json::from_str::<serde_json::Value>(tree.json()).is_ok());
        }
        Ok(TreeResult::ParseErrors(diagnostics)) => assert!(!diagnostics.is_empty()),
        Err(_) => {}
    }
});
