//! A loaded snapshot of the products and materials a transition reads.

use std::collections::HashMap;

use common::{MaterialId, ProductId};

use crate::error::{DomainError, Result};
use crate::material::Material;
use crate::product::Product;

/// Products and materials keyed by id.
///
/// The service layer loads exactly what an order operation needs and hands
/// the catalog to the pure order logic, which never touches the store.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: HashMap<ProductId, Product>,
    materials: HashMap<MaterialId, Material>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, product: Product) -> Self {
        self.insert_product(product);
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.insert_material(material);
        self
    }

    pub fn insert_product(&mut self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn insert_material(&mut self, material: Material) {
        self.materials.insert(material.id, material);
    }

    pub fn product(&self, id: ProductId) -> Result<&Product> {
        self.products
            .get(&id)
            .ok_or_else(|| DomainError::not_found("product", id))
    }

    pub fn material(&self, id: MaterialId) -> Result<&Material> {
        self.materials
            .get(&id)
            .ok_or_else(|| DomainError::not_found("material", id))
    }

    /// Materials referenced by every loaded product's bill-of-materials.
    pub fn referenced_materials(&self) -> Vec<MaterialId> {
        let mut ids: Vec<MaterialId> = self
            .products
            .values()
            .flat_map(|p| p.material_ids())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}
