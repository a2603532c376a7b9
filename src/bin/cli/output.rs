use clap::ValueEnum;
use serde::Serialize;
use skymmich::dto::{BulkPlateSolveResult, ImageDetail, PagedImages, SkyMapPoint, StatsDto};
use skymmich::models::{Equipment, Image, PlateSolvingJob, Settings, Tag};
use skymmich::services::sync::SyncReport;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// Bundled output configuration passed to all print functions
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    /// The output format
    pub format: OutputFormat,
    /// When true, print minimal output (just IDs or counts)
    pub quiet: bool,
}

/// Pretty-prints any response as JSON
fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: could not encode output: {}", e),
    }
}

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|s| !s.is_empty()).unwrap_or("-")
}

/// Prints one page of images in the specified format
pub fn print_images(page: &PagedImages, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                for image in &page.images {
                    println!("{}", image.id);
                }
                return;
            }
            if page.images.is_empty() {
                println!("No images found.");
                return;
            }
            let max_id = page.images.iter().map(|i| i.id.len()).max().unwrap_or(2);
            let max_title = page.images.iter().map(|i| i.title.len()).max().unwrap_or(5).max(5);
            println!(
                "{:<id_w$}  {:<title_w$}  {:<10}  {:<6}  OBJECT",
                "ID",
                "TITLE",
                "CAPTURED",
                "SOLVED",
                id_w = max_id,
                title_w = max_title,
            );
            for image in &page.images {
                let captured = image
                    .capture_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<id_w$}  {:<title_w$}  {:<10}  {:<6}  {}",
                    image.id,
                    image.title,
                    captured,
                    if image.plate_solved { "yes" } else { "no" },
                    or_dash(image.object_name.as_deref()),
                    id_w = max_id,
                    title_w = max_title,
                );
            }
            let pages = (page.total + page.page_size - 1) / page.page_size.max(1);
            println!("Page {} of {} ({} images)", page.page, pages.max(1), page.total);
        }
        OutputFormat::Json => print_json(page),
    }
}

/// Prints an image's detail view in the specified format
pub fn print_image_detail(detail: &ImageDetail, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            let image = &detail.image;
            if config.quiet {
                println!("{}", image.id);
                return;
            }
            println!("ID:          {}", image.id);
            println!("Immich ID:   {}", image.immich_id);
            println!("Title:       {}", image.title);
            println!("Filename:    {}", image.filename);
            println!("Object:      {}", or_dash(image.object_name.as_deref()));
            println!("Description: {}", or_dash(image.description.as_deref()));
            match image.capture_date {
                Some(dt) => println!("Captured:    {}", dt),
                None => println!("Captured:    unknown"),
            }
            println!("Camera:      {}", or_dash(image.camera_model.as_deref()));
            println!("Favorite:    {}", if image.favorite { "yes" } else { "no" });
            match (&detail.ra_hms, &detail.dec_dms) {
                (Some(ra), Some(dec)) => {
                    println!("RA / Dec:    {} / {}", ra, dec);
                    if let Some(scale) = image.pixel_scale {
                        println!("Scale:       {:.2}\"/px", scale);
                    }
                    if let Some(radius) = image.field_radius {
                        println!("Field:       {:.2}° radius", radius);
                    }
                }
                _ => println!("RA / Dec:    not solved"),
            }
            let tags: Vec<String> = detail.tags.iter().map(|t| t.get_name()).collect();
            println!("Tags:        {}", if tags.is_empty() { "-".to_string() } else { tags.join(", ") });
            for attached in &detail.equipment {
                println!(
                    "Equipment:   {} ({}){}",
                    attached.equipment.get_name(),
                    attached.equipment.get_kind(),
                    attached.notes.as_deref().map(|n| format!(" - {}", n)).unwrap_or_default()
                );
            }
            if let Some(job) = &detail.latest_job {
                println!("Latest job:  {} ({})", job.id, job.status);
            }
        }
        OutputFormat::Json => print_json(detail),
    }
}

/// Prints a single image in the specified format
pub fn print_image(image: &Image, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                println!("{}", image.id);
                return;
            }
            println!("ID:       {}", image.id);
            println!("Title:    {}", image.title);
            println!("Object:   {}", or_dash(image.object_name.as_deref()));
            println!("Favorite: {}", if image.favorite { "yes" } else { "no" });
            println!("Updated:  {}", image.updated_at);
        }
        OutputFormat::Json => print_json(image),
    }
}

/// Prints a list of tags in the specified format
pub fn print_tags(tags: &[Tag], config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if tags.is_empty() {
                if !config.quiet {
                    println!("No tags found.");
                }
                return;
            }
            if config.quiet {
                for tag in tags {
                    println!("{}", tag.get_id());
                }
                return;
            }
            let max_id = tags.iter().map(|t| t.get_id().len()).max().unwrap_or(2);
            println!("{:<id_w$}  NAME", "ID", id_w = max_id);
            for tag in tags {
                println!("{:<id_w$}  {}", tag.get_id(), tag.get_name(), id_w = max_id);
            }
        }
        OutputFormat::Json => print_json(tags),
    }
}

/// Prints a single tag in the specified format
pub fn print_tag(tag: &Tag, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                println!("{}", tag.get_id());
                return;
            }
            println!("ID:      {}", tag.get_id());
            println!("Name:    {}", tag.get_name());
            println!("Created: {}", tag.get_created_at());
        }
        OutputFormat::Json => print_json(tag),
    }
}

/// Prints the equipment catalog in the specified format
pub fn print_equipment_list(equipment: &[Equipment], config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if equipment.is_empty() {
                if !config.quiet {
                    println!("No equipment found.");
                }
                return;
            }
            if config.quiet {
                for entry in equipment {
                    println!("{}", entry.get_id());
                }
                return;
            }
            let max_id = equipment.iter().map(|e| e.get_id().len()).max().unwrap_or(2);
            println!("{:<id_w$}  {:<9}  NAME", "ID", "KIND", id_w = max_id);
            for entry in equipment {
                println!(
                    "{:<id_w$}  {:<9}  {}",
                    entry.get_id(),
                    entry.get_kind().as_str(),
                    entry.get_name(),
                    id_w = max_id,
                );
            }
        }
        OutputFormat::Json => print_json(equipment),
    }
}

/// Prints a single catalog entry in the specified format
pub fn print_equipment(equipment: &Equipment, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                println!("{}", equipment.get_id());
                return;
            }
            println!("ID:          {}", equipment.get_id());
            println!("Name:        {}", equipment.get_name());
            println!("Kind:        {}", equipment.get_kind());
            println!("Description: {}", or_dash(equipment.get_description().as_deref()));
            println!("Specs:       {}", equipment.get_specifications().0);
        }
        OutputFormat::Json => print_json(equipment),
    }
}

/// Prints a list of plate-solving jobs in the specified format
pub fn print_jobs(jobs: &[PlateSolvingJob], config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if jobs.is_empty() {
                if !config.quiet {
                    println!("No jobs found.");
                }
                return;
            }
            if config.quiet {
                for job in jobs {
                    println!("{}", job.id);
                }
                return;
            }
            let max_id = jobs.iter().map(|j| j.id.len()).max().unwrap_or(2);
            let max_image = jobs.iter().map(|j| j.image_id.len()).max().unwrap_or(5);
            println!(
                "{:<id_w$}  {:<image_w$}  {:<10}  {:>8}  ERROR",
                "ID",
                "IMAGE",
                "STATUS",
                "ATTEMPTS",
                id_w = max_id,
                image_w = max_image,
            );
            for job in jobs {
                println!(
                    "{:<id_w$}  {:<image_w$}  {:<10}  {:>8}  {}",
                    job.id,
                    job.image_id,
                    job.status.as_str(),
                    job.attempts,
                    or_dash(job.error_message.as_deref()),
                    id_w = max_id,
                    image_w = max_image,
                );
            }
        }
        OutputFormat::Json => print_json(jobs),
    }
}

/// Prints a single plate-solving job in the specified format
pub fn print_job(job: &PlateSolvingJob, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                println!("{}", job.id);
                return;
            }
            println!("ID:         {}", job.id);
            println!("Image:      {}", job.image_id);
            println!("Status:     {}", job.status);
            println!("Attempts:   {}", job.attempts);
            match job.submission_id {
                Some(id) => println!("Submission: {}", id),
                None => println!("Submission: -"),
            }
            match job.remote_job_id {
                Some(id) => println!("Remote job: {}", id),
                None => println!("Remote job: -"),
            }
            if let Some(error) = &job.error_message {
                println!("Error:      {}", error);
            }
            if let Some(next) = job.next_attempt_at {
                println!("Next try:   {}", next);
            }
            if let Some(done) = job.completed_at {
                println!("Completed:  {}", done);
            }
        }
        OutputFormat::Json => print_json(job),
    }
}

/// Prints the outcome of a bulk enqueue
pub fn print_bulk_result(result: &BulkPlateSolveResult, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                for job in &result.enqueued {
                    println!("{}", job.id);
                }
                return;
            }
            println!("Queued {} image(s)", result.enqueued.len());
            if !result.skipped.is_empty() {
                println!("Already queued: {}", result.skipped.join(", "));
            }
            if !result.not_found.is_empty() {
                println!("Not found: {}", result.not_found.join(", "));
            }
        }
        OutputFormat::Json => print_json(result),
    }
}

/// Prints a sync report in the specified format
pub fn print_sync_report(report: &SyncReport, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                println!("{}", report.scanned);
                return;
            }
            let seconds = (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0;
            println!("Sync finished in {:.1}s", seconds);
            println!("Scanned:  {}", report.scanned);
            println!("Created:  {}", report.created);
            println!("Updated:  {}", report.updated);
            println!("Removed:  {}", report.removed);
            println!("Queued:   {}", report.enqueued);
        }
        OutputFormat::Json => print_json(report),
    }
}

/// Prints gallery statistics in the specified format
pub fn print_stats(stats: &StatsDto, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if config.quiet {
                println!("{}", stats.total_images);
                return;
            }
            println!("Images:       {}", stats.total_images);
            println!("Plate solved: {}", stats.plate_solved);
            println!("Favorites:    {}", stats.favorites);
            println!("Equipment:    {}", stats.equipment);
            println!("Tags:         {}", stats.tags);
            println!(
                "Jobs:         {} pending, {} processing, {} solved, {} failed",
                stats.jobs_pending, stats.jobs_processing, stats.jobs_success, stats.jobs_failed
            );
            if let Some(latest) = stats.latest_capture {
                println!("Latest:       {}", latest.format("%Y-%m-%d"));
            }
        }
        OutputFormat::Json => print_json(stats),
    }
}

/// Prints the sky map points in the specified format
pub fn print_sky_map(points: &[SkyMapPoint], config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if points.is_empty() {
                if !config.quiet {
                    println!("No plate-solved images yet.");
                }
                return;
            }
            if config.quiet {
                for point in points {
                    println!("{}", point.image_id);
                }
                return;
            }
            let max_title = points.iter().map(|p| p.title.len()).max().unwrap_or(5).max(5);
            println!("{:<title_w$}  {:<14}  {:<13}  OBJECT", "TITLE", "RA", "DEC", title_w = max_title);
            for point in points {
                println!(
                    "{:<title_w$}  {:<14}  {:<13}  {}",
                    point.title,
                    point.ra_hms,
                    point.dec_dms,
                    or_dash(point.object_name.as_deref()),
                    title_w = max_title,
                );
            }
        }
        OutputFormat::Json => print_json(points),
    }
}

/// Prints the (masked) admin settings in the specified format
pub fn print_settings(settings: &Settings, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            println!("Immich URL:         {}", or_dash(settings.immich_url.as_deref()));
            println!("Immich API key:     {}", or_dash(settings.immich_api_key.as_deref()));
            if settings.immich_album_ids.is_empty() {
                println!("Albums:             whole library");
            } else {
                println!("Albums:             {}", settings.immich_album_ids.join(", "));
            }
            println!("Astrometry URL:     {}", settings.astrometry_url);
            println!("Astrometry enabled: {}", settings.astrometry_enabled);
            println!("Astrometry API key: {}", or_dash(settings.astrometry_api_key.as_deref()));
            println!("Auto plate solve:   {}", settings.auto_plate_solve);
            println!("XMP sidecars:       {}", settings.sidecar_enabled);
            println!("Max attempts:       {}", settings.max_solve_attempts);
        }
        OutputFormat::Json => print_json(settings),
    }
}

/// Prints a simple success message (for operations that don't return data)
pub fn print_success(message: &str, config: &OutputConfig) {
    match config.format {
        OutputFormat::Human => {
            if !config.quiet {
                println!("{}", message);
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({"status": "ok", "message": message})),
    }
}
