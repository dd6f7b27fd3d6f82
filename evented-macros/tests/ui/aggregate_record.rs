use evented::aggregate::Effects;
use evented::entity::Entity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Counter {
    value: i64,
}

#[derive(Debug, Deserialize, Serialize)]
struct By {
    by: i64,
}

#[evented_macros::aggregate(name = "counter")]
impl Counter {
    #[command]
    fn incr(&mut self, payload: By, _fx: &mut Effects<'_>) {
        self.value += payload.by;
    }
}

fn main() {
    let mut counter = Entity::<Counter>::new("c-1");
    counter.record("incr", By { by: 2 }).unwrap();
    counter.record("incr", serde_json::json!({ "by": 3 })).unwrap();
    assert_eq!(counter.state().value, 5);
    assert_eq!(counter.revision(), 2);
}
