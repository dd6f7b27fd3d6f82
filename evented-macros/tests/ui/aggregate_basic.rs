use evented::aggregate::{Aggregate, Effects};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Order {
    lines: Vec<String>,
    shipped: bool,
}

#[evented_macros::aggregate]
impl Order {
    #[command]
    fn add(&mut self, line: String, _fx: &mut Effects<'_>) {
        self.lines.push(line);
    }

    #[command(name = "ship-it")]
    fn ship(&mut self, _: (), fx: &mut Effects<'_>) {
        self.shipped = true;
        fx.enqueue("shipped", self.lines.len());
    }

    fn total(&self) -> usize {
        self.lines.len()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Ticket {
    open: bool,
}

#[evented_macros::aggregate(name = "support.ticket")]
impl Ticket {
    #[command]
    fn open(&mut self, _: (), _fx: &mut Effects<'_>) {
        self.open = true;
    }
}

fn main() {
    assert_eq!(Order::TYPE, "order");
    let table = Order::commands();
    assert!(table.contains("add"));
    assert!(table.contains("ship-it"));
    assert!(!table.contains("ship"));
    assert!(!table.contains("total"));
    assert_eq!(Order::default().total(), 0);

    assert_eq!(Ticket::TYPE, "support.ticket");
    assert_eq!(Ticket::commands().len(), 1);
}
