use vergen_gix::{BuildBuilder, GitclBuilder as GixBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The dashboard page and its assets are embedded with include_dir
    println!("cargo:rerun-if-changed=./static");

    generate_build_details()?;

    Ok(())
}

fn generate_build_details() -> Result<(), Box<dyn std::error::Error>> {
    let mut emitter = vergen_gix::Emitter::default();

    emitter.add_instructions(&BuildBuilder::all_build()?)?;

    if std::path::Path::new(".git").is_dir() {
        emitter.add_instructions(&GixBuilder::all_git()?)?;
    }

    emitter.emit()?;

    Ok(())
}
