//! Browser tests, run with `wasm-pack test --headless --chrome`.

#![cfg(target_arch = "wasm32")]

use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn get(object: &JsValue, key: &str) -> JsValue {
    js_sys::Reflect::get(object, &JsValue::from_str(key)).unwrap()
}

#[wasm_bindgen_test]
fn resolves_direct_alternative() {
    let link = ss_wasm::resolve_alternative("https://coinmarketcap.com/currencies/solana/");
    assert_eq!(get(&link, "hasAlternative").as_bool(), Some(true));
    assert_eq!(get(&link, "kind").as_string().as_deref(), Some("direct"));
    assert_eq!(
        get(&link, "primaryUrl").as_string().as_deref(),
        Some("https://www.coingecko.com/en/coins/solana")
    );

    let none = ss_wasm::resolve_alternative("https://example.com/");
    assert_eq!(get(&none, "hasAlternative").as_bool(), Some(false));
}

#[wasm_bindgen_test]
fn compiles_with_js_clock() {
    let result = ss_wasm::compile_rules("{}", "ext", None).unwrap();
    let rules = js_sys::Array::from(&get(&result, "rules"));
    assert_eq!(rules.length(), 4);
    assert!(ss_wasm::compile_rules("[]", "ext", None).is_err());
}
