pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";

use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		CreateCollectionBuilder, Document, Modifier, PointStruct, PointsIdsList,
		SetPayloadPointsBuilder, SparseVectorParamsBuilder, SparseVectorsConfigBuilder,
		UpsertPointsBuilder, Value, Vector,
	},
};
use serde_json::Value as JsonValue;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{Error, Result, models::PostDocument};

pub struct QdrantIndex {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
}
impl QdrantIndex {
	pub fn new(cfg: &echo_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone() })
	}

	/// Qdrant point ids must be integers or UUIDs; post ids are arbitrary
	/// strings, so the point id is a deterministic v5 UUID of the post id.
	pub fn point_id(post_id: &str) -> Uuid {
		Uuid::new_v5(&Uuid::NAMESPACE_OID, post_id.as_bytes())
	}

	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(&self.collection).await? {
			return Ok(());
		}

		let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

		sparse_vectors_config.add_named_vector_params(
			BM25_VECTOR_NAME,
			SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
		);

		self.client
			.create_collection(
				CreateCollectionBuilder::new(self.collection.clone())
					.sparse_vectors_config(sparse_vectors_config),
			)
			.await?;

		Ok(())
	}

	/// One bulk write per call; re-upserting an unchanged document is a
	/// no-op in effect, which is what makes at-least-once delivery safe.
	pub async fn upsert_documents(&self, docs: &[PostDocument]) -> Result<()> {
		if docs.is_empty() {
			return Ok(());
		}

		let mut points = Vec::with_capacity(docs.len());

		for doc in docs {
			let mut payload_map = HashMap::new();

			payload_map.insert("post_id".to_string(), Value::from(doc.id.clone()));
			payload_map.insert("thread_id".to_string(), Value::from(doc.thread_id.clone()));
			payload_map.insert("title".to_string(), Value::from(doc.title.clone()));
			payload_map.insert("body".to_string(), Value::from(doc.body.clone()));
			payload_map.insert("category".to_string(), Value::from(doc.category.clone()));
			payload_map.insert("author".to_string(), Value::from(doc.author.clone()));
			payload_map.insert(
				"content".to_string(),
				doc.content
					.as_ref()
					.map(|content| Value::from(content.clone()))
					.unwrap_or_else(|| Value::from(JsonValue::Null)),
			);
			payload_map.insert("deleted".to_string(), Value::from(doc.deleted));
			payload_map.insert(
				"updated_at".to_string(),
				Value::from(JsonValue::String(format_timestamp(doc.updated_at)?)),
			);

			let payload = Payload::from(payload_map);
			let mut vector_map = HashMap::new();

			vector_map.insert(
				BM25_VECTOR_NAME.to_string(),
				Vector::from(Document::new(doc.search_text(), BM25_MODEL)),
			);

			points.push(PointStruct::new(Self::point_id(&doc.id).to_string(), vector_map, payload));
		}

		let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	/// Soft delete: flips the payload flag and leaves the point in place so
	/// externally held references to the document keep resolving.
	pub async fn mark_deleted(&self, post_id: &str) -> Result<()> {
		let mut payload_map = HashMap::new();

		payload_map.insert("deleted".to_string(), Value::from(true));

		let request =
			SetPayloadPointsBuilder::new(self.collection.clone(), Payload::from(payload_map))
				.points_selector(PointsIdsList {
					ids: vec![Self::point_id(post_id).to_string().into()],
				})
				.wait(true);

		self.client.set_payload(request).await?;

		Ok(())
	}
}

fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
	ts.format(&Rfc3339)
		.map_err(|_| Error::InvalidArgument("Failed to format timestamp.".to_string()))
}
