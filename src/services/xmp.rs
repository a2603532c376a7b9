//! XMP sidecar rendering
//!
//! A sidecar carries the gallery's curation (title, description, tags) in
//! Dublin Core and the plate-solve calibration in Astronomy Visualization
//! Metadata, so photo tools that read `<file>.xmp` pick up both.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::models::{Image, Tag};

/// Escapes the five XML special characters
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn alt_lang(out: &mut String, element: &str, value: &str) {
    let _ = write!(
        out,
        "      <{element}>\n        <rdf:Alt>\n          <rdf:li xml:lang=\"x-default\">{}</rdf:li>\n        </rdf:Alt>\n      </{element}>\n",
        escape_xml(value)
    );
}

fn seq(out: &mut String, element: &str, values: &[String]) {
    let _ = writeln!(out, "      <{element}>\n        <rdf:Seq>");
    for value in values {
        let _ = writeln!(out, "          <rdf:li>{}</rdf:li>", escape_xml(value));
    }
    let _ = writeln!(out, "        </rdf:Seq>\n      </{element}>");
}

fn simple(out: &mut String, element: &str, value: &str) {
    let _ = writeln!(out, "      <{element}>{}</{element}>", escape_xml(value));
}

/// Renders the XMP packet for a plate-solved image
///
/// ### Arguments
///
/// * `image` - The image; its calibration fields must be set
/// * `tags` - Tags linked to the image, written as `dc:subject`
/// * `remote_job_id` - Astrometry.net job that produced the calibration
///
/// ### Returns
///
/// The packet, or `None` when the image has not been plate solved
pub fn render_sidecar(image: &Image, tags: &[Tag], remote_job_id: Option<i64>) -> Option<String> {
    if !image.plate_solved {
        return None;
    }
    let (ra, dec) = (image.ra?, image.dec?);

    let mut out = String::new();
    out.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
    out.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    out.push_str("  <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
    out.push_str("    <rdf:Description rdf:about=\"\"\n");
    out.push_str("        xmlns:dc=\"http://purl.org/dc/elements/1.1/\"\n");
    out.push_str("        xmlns:avm=\"http://www.communicatingastronomy.org/avm/1.0/\">\n");

    alt_lang(&mut out, "dc:title", &image.title);
    if let Some(description) = image.description.as_deref().filter(|d| !d.is_empty()) {
        alt_lang(&mut out, "dc:description", description);
    }
    if !tags.is_empty() {
        let _ = writeln!(out, "      <dc:subject>\n        <rdf:Bag>");
        for tag in tags {
            let _ = writeln!(out, "          <rdf:li>{}</rdf:li>", escape_xml(&tag.get_name()));
        }
        let _ = writeln!(out, "        </rdf:Bag>\n      </dc:subject>");
    }

    if let Some(object) = image.object_name.as_deref().filter(|o| !o.is_empty()) {
        let _ = writeln!(
            out,
            "      <avm:Subject.Name>\n        <rdf:Bag>\n          <rdf:li>{}</rdf:li>\n        </rdf:Bag>\n      </avm:Subject.Name>",
            escape_xml(object)
        );
    }

    simple(&mut out, "avm:Spatial.CoordinateFrame", "ICRS");
    simple(&mut out, "avm:Spatial.Equinox", "J2000");
    seq(&mut out, "avm:Spatial.ReferenceValue", &[format!("{:.6}", ra), format!("{:.6}", dec)]);

    if let (Some(width), Some(height)) = (image.width, image.height) {
        seq(&mut out, "avm:Spatial.ReferenceDimension", &[width.to_string(), height.to_string()]);
        seq(
            &mut out,
            "avm:Spatial.ReferencePixel",
            &[format!("{:.1}", (width as f64 + 1.0) / 2.0), format!("{:.1}", (height as f64 + 1.0) / 2.0)],
        );
    }
    if let Some(scale) = image.pixel_scale {
        // degrees per pixel; the x axis is flipped for a standard sky view
        let degrees = scale / 3600.0;
        seq(&mut out, "avm:Spatial.Scale", &[format!("{:.9}", -degrees), format!("{:.9}", degrees)]);
    }
    if let Some(rotation) = image.orientation {
        simple(&mut out, "avm:Spatial.Rotation", &format!("{:.4}", rotation));
    }
    if let Some(job_id) = remote_job_id {
        simple(&mut out, "avm:Spatial.Notes", &format!("Plate solved by Astrometry.net job {}", job_id));
    }

    out.push_str("    </rdf:Description>\n");
    out.push_str("  </rdf:RDF>\n");
    out.push_str("</x:xmpmeta>\n");
    out.push_str("<?xpacket end=\"w\"?>\n");
    Some(out)
}

/// Path of the sidecar for `filename` inside `dir`
///
/// Only the last path component of the filename is used, so names coming
/// from Immich cannot point outside the sidecar directory.
pub fn sidecar_path(dir: &Path, filename: &str) -> Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty());
    match name {
        Some(name) => Ok(dir.join(format!("{}.xmp", name))),
        None => bail!("Cannot derive a sidecar name from {:?}", filename),
    }
}

/// Writes a sidecar atomically: the packet goes to a temp file in the same
/// directory, which then replaces `<dir>/<filename>.xmp`
#[instrument(skip(contents))]
pub fn write_sidecar(dir: &Path, filename: &str, contents: &str) -> Result<PathBuf> {
    let path = sidecar_path(dir, filename)?;
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create sidecar directory {}", dir.display()))?;

    let mut temp_file = tempfile::Builder::new()
        .prefix(".skymmich-")
        .suffix(".xmp.tmp")
        .tempfile_in(dir)
        .context("Failed to create temporary sidecar")?;
    temp_file.write_all(contents.as_bytes())?;
    temp_file.flush()?;
    debug!("Wrote temporary sidecar {}", temp_file.path().display());

    temp_file
        .persist(&path)
        .with_context(|| format!("Failed to move sidecar into place at {}", path.display()))?;
    info!("Wrote sidecar {}", path.display());
    Ok(path)
}
