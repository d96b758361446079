use std::sync::atomic::{AtomicUsize, Ordering};

use dbc_core::{Contract, ContractSpec, EnforcementMode, Error};
use proptest::prelude::*;

fn contract(spec: ContractSpec) -> Contract {
    Contract::compile(&spec).unwrap().with_mode(EnforcementMode::Full)
}

proptest! {
    #[test]
    fn passing_call_returns_callee_value(x in -1_000_000i64..1_000_000, y in -1_000_000i64..1_000_000) {
        let spec = ContractSpec::builder()
            .pre("isinstance(x, int) and isinstance(y, int)")
            .post("RETURN == x + y")
            .build();
        let add = contract(spec)
            .wrap("add", &["x", "y"], |(x, y): (i64, i64)| x + y)
            .unwrap();
        prop_assert_eq!(add.call((x, y)).unwrap(), x + y);
    }

    #[test]
    fn false_precondition_never_runs_callee(x in any::<i64>()) {
        let calls = AtomicUsize::new(0);
        let f = contract(ContractSpec::builder().pre("x >= 0").build())
            .wrap("f", &["x"], |(x,): (i64,)| {
                calls.fetch_add(1, Ordering::SeqCst);
                x
            })
            .unwrap();
        let outcome = f.call((x,));
        if x >= 0 {
            prop_assert_eq!(outcome.unwrap(), x);
            prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        } else {
            prop_assert!(matches!(outcome, Err(Error::PreconditionViolation(_))));
            prop_assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn parsed_block_matches_builder(bound in 0i64..1000) {
        let text = format!("Doc.\n\npre:\n  - x > {bound}\npost:\n  - RETURN >= x  # monotone\n");
        let parsed = ContractSpec::parse(&text).unwrap();
        let built = ContractSpec::builder()
            .pre(format!("x > {bound}"))
            .post("RETURN >= x")
            .build();
        prop_assert_eq!(parsed, built);
    }
}
