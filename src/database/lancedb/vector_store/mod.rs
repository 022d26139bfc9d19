
use super::{CHUNKS_TABLE, ChunkMetadata, EmbeddingRecord};
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Vector table of chunk embeddings, searched by cosine distance
pub struct VectorStore {
    connection: Connection,
    table: Table,
    vector_dimension: usize,
}

impl std::fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("table", &CHUNKS_TABLE)
            .field("vector_dimension", &self.vector_dimension)
            .finish_non_exhaustive()
    }
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_metadata: ChunkMetadata,
    pub similarity_score: f32,
}

impl VectorStore {
    /// Create an empty chunk table for vectors of `vector_dimension` at `db_path`
    #[inline]
    pub async fn create(db_path: &Path, vector_dimension: usize) -> Result<Self> {
        if vector_dimension == 0 {
            return Err(RagError::Database(
                "Vector dimension must be greater than zero".to_string(),
            ));
        }

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {e}"))
        })?;

        let connection = Self::connect(db_path).await?;
        let table = connection
            .create_empty_table(CHUNKS_TABLE, Self::create_schema(vector_dimension))
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {e}")))?;

        info!(
            "Created vector table with {} dimensions at {}",
            vector_dimension,
            db_path.display()
        );

        Ok(Self {
            connection,
            table,
            vector_dimension,
        })
    }

    /// Open the chunk table of an existing vector database
    #[inline]
    pub async fn open(db_path: &Path) -> Result<Self> {
        if !db_path.is_dir() {
            return Err(RagError::Database(format!(
                "Vector database {} is missing",
                db_path.display()
            )));
        }

        let connection = Self::connect(db_path).await?;
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {e}")))?;

        if !table_names.iter().any(|name| name == CHUNKS_TABLE) {
            return Err(RagError::Database(format!(
                "Vector database has no '{CHUNKS_TABLE}' table"
            )));
        }

        let table = connection
            .open_table(CHUNKS_TABLE)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {e}")))?;

        let vector_dimension = Self::detect_vector_dimension(&table).await?;
        debug!("Opened vector table with {} dimensions", vector_dimension);

        Ok(Self {
            connection,
            table,
            vector_dimension,
        })
    }

    async fn connect(db_path: &Path) -> Result<Connection> {
        let uri = format!("file://{}", db_path.display());
        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {e}")))
    }

    /// Detect vector dimension from the table schema
    async fn detect_vector_dimension(table: &Table) -> Result<usize> {
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {e}")))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size).map_err(|_| {
                        RagError::Database(format!("Invalid vector dimension {size}"))
                    });
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("document_title", DataType::Utf8, false),
            Field::new("heading_path", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("token_count", DataType::UInt32, false),
        ]))
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Store multiple embeddings in one append
    #[inline]
    pub async fn insert_batch(&self, records: &[EmbeddingRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(());
        }

        if let Some(record) = records
            .iter()
            .find(|r| r.vector.len() != self.vector_dimension)
        {
            return Err(RagError::DimensionMismatch {
                expected: self.vector_dimension,
                actual: record.vector.len(),
            });
        }

        debug!("Storing batch of {} embeddings", records.len());

        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert embeddings: {e}")))?;

        info!("Stored {} embeddings", records.len());
        Ok(())
    }

    /// Create a RecordBatch from embedding records
    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let vector_dim = self.vector_dimension;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut document_titles = Vec::with_capacity(len);
        let mut heading_paths = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut token_counts = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            document_titles.push(record.metadata.document_title.as_str());
            heading_paths.push(record.metadata.heading_path.as_str());
            contents.push(record.metadata.content.as_str());
            chunk_indices.push(record.metadata.chunk_index);
            token_counts.push(record.metadata.token_count);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| RagError::Database(format!("Failed to create vector array: {e}")))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(document_titles)),
            Arc::new(StringArray::from(heading_paths)),
            Arc::new(StringArray::from(contents)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(UInt32Array::from(token_counts)),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {e}")))
    }

    /// Find the `limit` stored chunks closest to `query_vector` by cosine distance.
    ///
    /// Results are ordered by decreasing similarity, ties broken by document
    /// title and then chunk index.
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if query_vector.len() != self.vector_dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.vector_dimension,
                actual: query_vector.len(),
            });
        }

        if limit == 0 || self.count_embeddings().await? == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching for similar vectors with limit: {}", limit);

        let results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {e}")))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {e}")))?;

        let mut search_results = Self::parse_search_results_stream(results).await?;
        search_results.sort_by(|a, b| {
            b.similarity_score
                .total_cmp(&a.similarity_score)
                .then_with(|| {
                    a.chunk_metadata
                        .document_title
                        .cmp(&b.chunk_metadata.document_title)
                })
                .then_with(|| {
                    a.chunk_metadata
                        .chunk_index
                        .cmp(&b.chunk_metadata.chunk_index)
                })
        });
        search_results.truncate(limit);

        Ok(search_results)
    }

    /// Parse search results from LanceDB stream into SearchResult structs
    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>> {
        let mut search_results = Vec::new();

        while let Some(batch_result) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {e}")))?
        {
            search_results.extend(Self::parse_search_batch(&batch_result)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let document_titles = string_column(batch, "document_title")?;
        let heading_paths = string_column(batch, "heading_path")?;
        let contents = string_column(batch, "content")?;
        let chunk_indices = u32_column(batch, "chunk_index")?;
        let token_counts = u32_column(batch, "token_count")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut search_results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let chunk_metadata = ChunkMetadata {
                document_title: document_titles.value(row).to_string(),
                heading_path: heading_paths.value(row).to_string(),
                content: contents.value(row).to_string(),
                chunk_index: chunk_indices.value(row),
                token_count: token_counts.value(row),
            };

            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            // Cosine distance is 1 - cosine similarity
            let similarity_score = 1.0 - distance;

            search_results.push(SearchResult {
                chunk_metadata,
                similarity_score,
            });
        }

        Ok(search_results)
    }

    /// Get the total number of embeddings stored
    #[inline]
    pub async fn count_embeddings(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {e}")))
    }

    /// Release the table handle and connection
    #[inline]
    pub fn close(self) {
        let Self {
            connection, table, ..
        } = self;
        drop(table);
        drop(connection);
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {name} column type")))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::Database(format!("Invalid {name} column type")))
}
