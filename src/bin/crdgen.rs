use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&starburst_addon_operator::resources::Addon::crd())?);
    Ok(())
}
