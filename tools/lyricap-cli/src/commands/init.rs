//! Initialize a new Lyricap project.

use std::path::PathBuf;

use lyricap_project_model::ProjectDocument;

pub fn run(name: String, output: PathBuf) -> anyhow::Result<()> {
    let project_dir = output.join(&name);
    println!("Creating project '{}' at {}", name, project_dir.display());

    ProjectDocument::create(&project_dir, &name)
        .map_err(|e| anyhow::anyhow!("Failed to create project: {e}"))?;
    tracing::debug!(dir = %project_dir.display(), "Project created");

    println!("Project created successfully:");
    println!("  Directory: {}", project_dir.display());
    println!();
    println!("Directory structure:");
    println!("  {}/", name);
    println!("  ├── project.json (timeline, lyrics, metadata)");
    println!("  ├── media/       (song, images, clips)");
    println!("  └── exports/     (rendered output)");
    println!();
    println!("Set primary_track.source_ref in project.json before exporting.");

    Ok(())
}
