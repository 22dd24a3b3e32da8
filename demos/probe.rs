/*
 * Prints the operations the running kernel supports.
 */

fn main() -> rill::Result<()> {
    let probe = rill::probe()?;

    println!("last op: {:?}", probe.last_op());
    for (op, supported) in probe.ops() {
        println!("{:>16} {}", format!("{:?}", op), if supported { "yes" } else { "no" });
    }

    Ok(())
}
