#![no_main]

use ciltac::prelude::*;
use libfuzzer_sys::fuzz_target;

// The first byte selects the argument count, the rest is the code stream.
fuzz_target!(|data: &[u8]| {
    let Some((&arity, code)) = data.split_first() else {
        return;
    };
    let method = MethodDescriptor::new("Fuzzed", Token::new(0x0600_0001))
        .with_params(vec![TacType::I32; usize::from(arity % 8)])
        .with_locals(vec![TacType::Object; 4])
        .with_code(code.to_vec());
    let _ = translate_method(
        &method,
        &MemoryResolver::new(),
        &TypeHierarchy::new(),
        &TranslationConfig::minimal(),
    );

    if let Ok(body) = MethodBody::parse(data) {
        let method = MethodDescriptor::from_body(
            "FuzzedBody",
            Token::new(0x0600_0002),
            Vec::new(),
            TacType::Void,
            Vec::new(),
            body,
        );
        let _ = translate_method(
            &method,
            &MemoryResolver::new(),
            &TypeHierarchy::new(),
            &TranslationConfig::default(),
        );
    }
});
