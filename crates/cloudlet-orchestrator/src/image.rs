use crate::properties::{sizing_hints, PropertyInheritance};
use cloudlet_common::{
    ImageCatalog, ImageKind, ImageMetadata, ImageRecord, Instance, InstanceStore, PropertyMap,
    RequestContext, Result,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Reserves image records that a compute node later fills with snapshot data.
#[derive(Clone)]
pub struct ImageWriter {
    images: Arc<dyn ImageCatalog>,
    instances: Arc<dyn InstanceStore>,
    inheritance: PropertyInheritance,
}

impl ImageWriter {
    pub fn new(
        images: Arc<dyn ImageCatalog>,
        instances: Arc<dyn InstanceStore>,
        inheritance: PropertyInheritance,
    ) -> Self {
        Self {
            images,
            instances,
            inheritance,
        }
    }

    #[instrument(skip(self, ctx, instance, extra_properties), fields(instance_uuid = %instance.uuid))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        name: &str,
        kind: &ImageKind,
        extra_properties: Option<&PropertyMap>,
    ) -> Result<ImageRecord> {
        let system_metadata = self.instances.system_metadata(ctx, &instance.uuid).await?;
        let properties =
            self.inheritance
                .build(ctx, instance, kind, &system_metadata, extra_properties);

        let mut metadata = ImageMetadata {
            name: name.to_string(),
            is_public: true,
            min_ram: None,
            min_disk: None,
            properties,
        };

        if *kind == ImageKind::Snapshot {
            let source = match instance.image_ref.as_deref() {
                Some(image_ref) => self.images.show(ctx, image_ref).await?,
                None => None,
            };
            let (min_ram, min_disk) = sizing_hints(source.as_ref(), instance);
            metadata.min_ram = min_ram;
            metadata.min_disk = min_disk;
        }

        let record = self.images.create(ctx, metadata).await?;
        debug!(image_id = %record.id, %name, "Image record created");
        Ok(record)
    }
}
