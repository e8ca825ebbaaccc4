use std::{cell::Cell, rc::Rc, time::Duration};

use crate::quota::CycleClock;

/// A cycle clock that only moves when told to. Clones share the same reading.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.now.set(self.now.get().saturating_add(nanos));
    }
}

impl CycleClock for ManualClock {
    fn now(&self) -> u64 {
        self.now.get()
    }
}

// Scripts shared by the sandbox tests
pub const TIGHT_LOOP: &str = "while true do end";
pub const RETURN_ONE: &str = "return 1";
pub const STRING_DOUBLING: &str = r#"
local s = "x"
while true do
    s = s .. s
end
"#;
