//! Show project information.

use std::path::PathBuf;

use lyricap_project_model::ProjectDocument;

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let doc =
        ProjectDocument::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;
    let problems = doc.validate();

    if json {
        let value = serde_json::json!({
            "project": doc,
            "problems": problems,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Project: {}", doc.name);
    println!("  Version: {}", doc.version);
    println!("  Created: {}", doc.created_at);
    println!("  Modified: {}", doc.modified_at);
    println!();

    println!("Metadata:");
    println!("  Title: {}", display_or_dash(&doc.metadata.title));
    println!("  Artist: {}", display_or_dash(&doc.metadata.artist));
    if let Some(album) = &doc.metadata.album {
        println!("  Album: {album}");
    }
    if let Some(cover) = &doc.metadata.cover_ref {
        println!("  Cover: {cover}");
    }
    if let Some(background) = &doc.metadata.background_ref {
        println!(
            "  Background: {background} ({:?})",
            doc.metadata.background_kind
        );
    }
    println!();

    println!("Primary track:");
    match &doc.primary_track {
        Some(track) => match track.duration_secs {
            Some(d) => println!("  {} ({d:.1}s)", track.source_ref),
            None => println!("  {} (duration unknown)", track.source_ref),
        },
        None => println!("  (none)"),
    }
    println!();

    println!("Timeline: {} slides", doc.timeline.slides.len());
    for slide in &doc.timeline.slides {
        println!(
            "  [{:>7.2} - {:>7.2}] {:<5} {:<12} {}{}",
            slide.start_secs,
            slide.end_secs,
            format!("{:?}", slide.kind).to_lowercase(),
            slide.id,
            slide.source_ref,
            if slide.is_sounding() {
                format!(
                    " (volume {:.2}{})",
                    slide.volume,
                    if slide.is_muted { ", muted" } else { "" }
                )
            } else {
                String::new()
            }
        );
    }
    println!();

    println!("Lyrics: {} lines", doc.lyrics.len());
    for line in &doc.lyrics {
        println!(
            "  [{:>7.2} - {:>7.2}] {}",
            line.start_secs, line.end_secs, line.text
        );
    }
    println!();

    println!("Render config:");
    println!("  Background mode: {:?}", doc.render_config.background_mode);
    println!("  Lyric display: {:?}", doc.render_config.lyric_display);
    println!("  Style preset: {}", doc.render_config.style_preset);
    println!("  Font scale: {}", doc.render_config.font_scale);
    println!();

    if problems.is_empty() {
        println!("[OK] Project is ready to export");
    } else {
        for problem in &problems {
            println!("[WARN] {problem}");
        }
    }

    Ok(())
}

fn display_or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}
