use crate::output::print_json;
use hazmap_core::gmm::ModelRegistry;

pub fn run(json: bool) -> anyhow::Result<()> {
    let registry = ModelRegistry::with_builtins();
    let keys = registry.keys();
    if json {
        return print_json(&keys);
    }
    for key in keys {
        println!("{key}");
    }
    Ok(())
}
