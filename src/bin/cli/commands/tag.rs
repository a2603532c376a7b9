use clap::Subcommand;

use crate::client::SkymmichClient;
use crate::output::{self, OutputConfig};

/// Tag management commands
#[derive(Subcommand, Debug)]
pub enum TagCommands {
    /// List all tags, or the tags of one image
    List {
        /// Only list tags of this image
        #[clap(long)]
        image: Option<String>,
    },
    /// Create a new tag
    Create {
        /// Name of the tag
        name: String,
    },
    /// Add a tag to an image
    Add {
        /// The image ID
        image_id: String,
        /// The tag ID
        tag_id: String,
    },
    /// Remove a tag from an image
    Remove {
        /// The image ID
        image_id: String,
        /// The tag ID
        tag_id: String,
    },
}

/// Executes a tag command
pub async fn execute(
    client: &SkymmichClient,
    cmd: TagCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        TagCommands::List { image } => {
            let tags = match image {
                Some(image_id) => client.list_image_tags(&image_id).await?,
                None => client.list_tags().await?,
            };
            output::print_tags(&tags, config);
        }
        TagCommands::Create { name } => {
            let tag = client.create_tag(name).await?;
            output::print_tag(&tag, config);
        }
        TagCommands::Add { image_id, tag_id } => {
            client.add_tag_to_image(&image_id, &tag_id).await?;
            output::print_success(&format!("Added tag {} to image {}", tag_id, image_id), config);
        }
        TagCommands::Remove { image_id, tag_id } => {
            client.remove_tag_from_image(&image_id, &tag_id).await?;
            output::print_success(&format!("Removed tag {} from image {}", tag_id, image_id), config);
        }
    }
    Ok(())
}
