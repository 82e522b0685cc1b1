//! Build a small topology by hand and print it in its JSON form
use topology::{presets, Delay, LinkConfig, Topology};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut b = Topology::builder("dumbbell");
    b.add_host("h1")?;
    b.add_host("h2")?;
    b.add_switch("s1")?;
    b.add_switch("s2")?;
    b.add_link("h1", "s1", 100.0, Delay::from_millis(1))?;
    b.add_link_with(
        "s1",
        "s2",
        LinkConfig::new(10.0, "20ms".parse()?)
            .with_jitter(Delay::from_millis(2))
            .with_max_queue_size(100),
    )?;
    b.add_link("s2", "h2", 100.0, Delay::from_millis(1))?;
    let topo = b.build();

    println!("{}", topo.to_json_pretty()?);

    println!("\nBuilt-in topologies:");
    for preset in presets::all() {
        let t = preset.build()?;
        println!(
            "  {:<15} {} hosts, {} switches, {} links",
            preset.name,
            t.hosts().count(),
            t.switches().count(),
            t.links().len()
        );
    }
    Ok(())
}
