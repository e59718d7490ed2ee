#![no_main]

use std::cell::RefCell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trackview_bind::{Binding, TrackerRoot, use_binding};
use trackview_core::{Deps, deps};
use trackview_host::Host;
use trackview_reactive::{Observable, ReactiveError, Tracker};

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Render(Option<u8>),
    Commit,
    Set(i8),
    Flush,
    Unmount,
}

fuzz_target!(|ops: Vec<FuzzOp>| {
    let host = Host::new();
    let root = TrackerRoot::new(Tracker::new()).install(&host);
    let source = Observable::new(0i8);
    let seen: Rc<RefCell<Vec<Binding<i8>>>> = Rc::default();

    let source_clone = source.clone();
    let seen_clone = Rc::clone(&seen);
    let mut site = host.create(move |cx, deps: &Option<Deps>| {
        let source = source_clone.clone();
        let binding = use_binding(cx, deps.clone(), move || match source.get() {
            i8::MIN => Err(ReactiveError::failed("min")),
            v => Ok(v),
        })?;
        seen_clone.borrow_mut().push(binding.clone());
        Ok(**binding.value())
    });

    for op in ops.into_iter().take(256) {
        match op {
            FuzzOp::Render(value) => {
                let _ = site.render(&value.map(|v| deps![v]));
            }
            FuzzOp::Commit => {
                let _ = site.commit();
            }
            FuzzOp::Set(v) => source.set(v),
            FuzzOp::Flush => {
                let _ = root.tracker().flush();
                let _ = host.take_update_requests();
            }
            FuzzOp::Unmount => site.unmount(),
        }

        let mut live = Vec::new();
        for binding in seen.borrow().iter() {
            if let Some(c) = binding.computation()
                && !c.is_stopped()
                && !live.contains(&c)
            {
                live.push(c);
            }
        }
        assert!(live.len() <= 1, "two live computations for one call site");
        if !site.is_mounted() {
            assert!(live.is_empty(), "computation outlived unmount");
            assert!(root.registry().is_empty(), "entry outlived unmount");
        }
    }
});
