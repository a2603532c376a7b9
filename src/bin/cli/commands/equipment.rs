use clap::Subcommand;
use skymmich::dto::CreateEquipmentDto;
use skymmich::models::JsonValue;

use crate::client::SkymmichClient;
use crate::output::{self, OutputConfig};

/// Equipment catalog commands
#[derive(Subcommand, Debug)]
pub enum EquipmentCommands {
    /// List the catalog
    List {
        /// Only this kind (telescope, camera, mount, filter, guider, accessory)
        #[clap(long)]
        kind: Option<String>,
    },
    /// Add a catalog entry
    Create {
        /// Display name, e.g. "RedCat 51"
        name: String,
        /// telescope, camera, mount, filter, guider or accessory
        #[clap(long)]
        kind: String,
        #[clap(long)]
        description: Option<String>,
        /// Specifications as a JSON object, e.g. '{"focal_length_mm": 250}'
        #[clap(long)]
        specs: Option<String>,
    },
    /// Show a catalog entry
    Show {
        /// The equipment ID
        id: String,
    },
    /// Delete a catalog entry
    Delete {
        /// The equipment ID
        id: String,
    },
    /// Record that an image was taken with a piece of equipment
    Attach {
        /// The image ID
        image_id: String,
        /// The equipment ID
        equipment_id: String,
        /// Usage notes, e.g. "with 0.8x reducer"
        #[clap(long)]
        notes: Option<String>,
    },
    /// Remove a piece of equipment from an image
    Detach {
        /// The image ID
        image_id: String,
        /// The equipment ID
        equipment_id: String,
    },
}

/// Executes an equipment command
pub async fn execute(
    client: &SkymmichClient,
    cmd: EquipmentCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        EquipmentCommands::List { kind } => {
            let equipment = client.list_equipment(kind.as_deref()).await?;
            output::print_equipment_list(&equipment, config);
        }
        EquipmentCommands::Create {
            name,
            kind,
            description,
            specs,
        } => {
            let specifications = specs
                .map(|s| serde_json::from_str::<serde_json::Value>(&s))
                .transpose()
                .map_err(|e| format!("Invalid --specs JSON: {}", e))?
                .map(JsonValue);
            let dto = CreateEquipmentDto {
                name,
                kind,
                description,
                specifications,
            };
            let equipment = client.create_equipment(&dto).await?;
            output::print_equipment(&equipment, config);
        }
        EquipmentCommands::Show { id } => {
            let equipment = client.get_equipment(&id).await?;
            output::print_equipment(&equipment, config);
        }
        EquipmentCommands::Delete { id } => {
            client.delete_equipment(&id).await?;
            output::print_success(&format!("Deleted equipment {}", id), config);
        }
        EquipmentCommands::Attach {
            image_id,
            equipment_id,
            notes,
        } => {
            client.attach_equipment(&image_id, &equipment_id, notes).await?;
            output::print_success(
                &format!("Attached equipment {} to image {}", equipment_id, image_id),
                config,
            );
        }
        EquipmentCommands::Detach { image_id, equipment_id } => {
            client.detach_equipment(&image_id, &equipment_id).await?;
            output::print_success(
                &format!("Detached equipment {} from image {}", equipment_id, image_id),
                config,
            );
        }
    }
    Ok(())
}
