use anyhow::Context;

fn main() -> anyhow::Result<()> {
    aether::run().context("aether command failed")
}
