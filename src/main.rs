fn main() -> anyhow::Result<()> {
    flick::cli::run()
}
