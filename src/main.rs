mod app;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use eframe::egui;
use image::RgbaImage;
use tn_annotate::config::Cli;
use tn_annotate::overlay;
use tn_annotate::palette::{self, Rgb};
use tn_annotate::session::AnnotationSession;
use tn_annotate::store::FileStore;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tn_annotate=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn pick_image() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Images", &["png", "jpg", "jpeg", "bmp", "tif", "tiff"])
        .pick_file()
}

/// Decodes the frame and, when a mask is given, tints its foreground.
fn load_frame(image: &Path, mask: Option<&Path>) -> Result<RgbaImage, image::ImageError> {
    let base = image::open(image)?.to_rgba8();
    let Some(mask) = mask else {
        return Ok(base);
    };
    let mask = image::open(mask)?;
    let tint = Rgb::from_hex(palette::color_for_label(palette::MASK_LABEL))
        .unwrap_or(Rgb::new(0xFF, 0, 0));
    Ok(overlay::composite_mask(&base, &mask, tint))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = cli.check_paths() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    let (catalog, input) = match (cli.catalog(), cli.external_input()) {
        (Ok(c), Ok(i)) => (c, i),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let Some(image_path) = cli.image.clone().or_else(pick_image) else {
        eprintln!("no image selected");
        return ExitCode::FAILURE;
    };

    let frame = match load_frame(&image_path, cli.mask.as_deref()) {
        Ok(frame) => frame,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", image_path.display());
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        image = %image_path.display(),
        width = frame.width(),
        height = frame.height(),
        mask = cli.mask.is_some(),
        "frame loaded"
    );

    let store = FileStore::new(&cli.store_dir);
    tracing::debug!(path = %store.path().display(), "snapshot store");
    let session = AnnotationSession::open(store, catalog, cli.clear_persisted, &input);

    let title = format!(
        "tn-annotate - {}",
        image_path
            .file_name()
            .unwrap_or_default()
            .to_str()
            .unwrap_or("")
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title(&title),
        ..Default::default()
    };

    let app_name = title.clone();
    let result = eframe::run_native(
        &app_name,
        options,
        Box::new(move |_cc| Ok(Box::new(app::AnnotatorApp::new(session, frame, title)))),
    );
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "window closed with an error");
            ExitCode::FAILURE
        }
    }
}
