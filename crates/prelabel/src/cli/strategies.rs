//! The `prelabel strategies` command.

use prelabel_core::StrategyKind;

pub async fn execute() -> anyhow::Result<()> {
    print!("{}", render());
    Ok(())
}

fn render() -> String {
    let mut out = String::from("Available prompt strategies:\n");
    for kind in StrategyKind::ALL {
        out.push_str(&format!("  {:<14}{}\n", kind.id(), kind.description()));
    }
    out.push_str("\nSelect one with `[prompt] strategy = \"<id>\"` or `annotate --strategy <id>`.\n");
    out
}
