use chrono::{DateTime, Utc};
use clap::{Subcommand, ValueEnum};
use skymmich::dto::{ImageQueryDto, ImageSort, UpdateImageDto};

use crate::client::SkymmichClient;
use crate::output::{self, OutputConfig};

/// Sort order accepted by `image list`
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    /// Newest capture first
    CaptureDate,
    Title,
    /// Most recently synced first
    CreatedAt,
}

impl From<SortArg> for ImageSort {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::CaptureDate => ImageSort::CaptureDate,
            SortArg::Title => ImageSort::Title,
            SortArg::CreatedAt => ImageSort::CreatedAt,
        }
    }
}

/// Gallery commands
#[derive(Subcommand, Debug)]
pub enum ImageCommands {
    /// List images
    List {
        /// Match title, object, description or filename
        #[clap(long)]
        search: Option<String>,
        /// Only images carrying this tag (repeatable; all must match)
        #[clap(long = "tag")]
        tag_ids: Vec<String>,
        /// Only images taken with this equipment
        #[clap(long)]
        equipment: Option<String>,
        /// Only plate-solved (true) or unsolved (false) images
        #[clap(long)]
        solved: Option<bool>,
        /// Only favorites
        #[clap(long)]
        favorites: bool,
        /// Captured at or after this RFC 3339 time
        #[clap(long)]
        after: Option<DateTime<Utc>>,
        /// Captured at or before this RFC 3339 time
        #[clap(long)]
        before: Option<DateTime<Utc>>,
        #[clap(long, value_enum, default_value_t = SortArg::CaptureDate)]
        sort: SortArg,
        #[clap(long)]
        page: Option<i64>,
        #[clap(long)]
        page_size: Option<i64>,
    },
    /// Show an image with its tags, equipment and latest job
    Show {
        /// The image ID
        id: String,
    },
    /// Edit an image
    Update {
        /// The image ID
        id: String,
        #[clap(long)]
        title: Option<String>,
        /// Empty string clears the description
        #[clap(long)]
        description: Option<String>,
        /// Empty string clears the object name
        #[clap(long)]
        object: Option<String>,
        #[clap(long)]
        favorite: Option<bool>,
    },
    /// Delete the local record of an image
    Delete {
        /// The image ID
        id: String,
    },
    /// Queue images for plate solving
    Solve {
        /// Image IDs to queue
        ids: Vec<String>,
        /// Queue every unsolved image instead
        #[clap(long, conflicts_with = "ids")]
        all_unsolved: bool,
    },
}

/// Executes an image command
pub async fn execute(
    client: &SkymmichClient,
    cmd: ImageCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ImageCommands::List {
            search,
            tag_ids,
            equipment,
            solved,
            favorites,
            after,
            before,
            sort,
            page,
            page_size,
        } => {
            let query = ImageQueryDto {
                search,
                tag_ids,
                equipment_id: equipment,
                plate_solved: solved,
                favorite: favorites.then_some(true),
                captured_after: after,
                captured_before: before,
                sort: sort.into(),
                page,
                page_size,
            };
            let images = client.list_images(&query).await?;
            output::print_images(&images, config);
        }
        ImageCommands::Show { id } => {
            let detail = client.get_image(&id).await?;
            output::print_image_detail(&detail, config);
        }
        ImageCommands::Update {
            id,
            title,
            description,
            object,
            favorite,
        } => {
            let edit = UpdateImageDto {
                title,
                description,
                object_name: object,
                favorite,
            };
            if edit.is_empty() {
                return Err("Nothing to update; pass --title, --description, --object or --favorite".into());
            }
            let image = client.update_image(&id, &edit).await?;
            output::print_image(&image, config);
        }
        ImageCommands::Delete { id } => {
            client.delete_image(&id).await?;
            output::print_success(&format!("Deleted image {}", id), config);
        }
        ImageCommands::Solve { ids, all_unsolved } => {
            if let [id] = ids.as_slice() {
                let job = client.solve_image(id).await?;
                output::print_job(&job, config);
            } else {
                if ids.is_empty() && !all_unsolved {
                    return Err("Pass image IDs or --all-unsolved".into());
                }
                let result = client.solve_bulk(ids, all_unsolved).await?;
                output::print_bulk_result(&result, config);
            }
        }
    }
    Ok(())
}
