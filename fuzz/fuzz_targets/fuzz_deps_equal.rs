#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trackview_core::{Dep, Deps, deps_equal};

#[derive(Arbitrary, Debug)]
enum FuzzDep {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
}

impl FuzzDep {
    fn to_dep(&self) -> Dep {
        match self {
            FuzzDep::Unit => Dep::Unit,
            FuzzDep::Bool(v) => Dep::from(*v),
            FuzzDep::Int(v) => Dep::from(*v),
            FuzzDep::Float(v) => Dep::from(*v),
            FuzzDep::Char(v) => Dep::from(*v),
            FuzzDep::Str(v) => Dep::from(v.as_str()),
        }
    }
}

fuzz_target!(|input: (Option<Vec<FuzzDep>>, Option<Vec<FuzzDep>>)| {
    let to_deps = |raw: &Option<Vec<FuzzDep>>| -> Option<Deps> {
        raw.as_ref().map(|slots| slots.iter().map(FuzzDep::to_dep).collect())
    };
    let a = to_deps(&input.0);
    let b = to_deps(&input.1);

    let ab = deps_equal(a.as_ref(), b.as_ref());
    assert_eq!(ab, deps_equal(b.as_ref(), a.as_ref()));
    if let Some(a) = &a {
        assert!(deps_equal(Some(a), Some(a)));
    }
    if ab && let (Some(a), Some(b)) = (&a, &b) {
        assert_eq!(a.len(), b.len());
    }
});
