use common::{MaterialId, Money, PriceTierId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Catalog, LineRequest, Material, NewMaterial, NewOrder, NewProduct, Order, PriceTier, Product,
    bom, pricing,
};

fn tiers(count: u32) -> Vec<PriceTier> {
    (0..count)
        .map(|i| PriceTier {
            id: PriceTierId::new(),
            start: i * 10 + 1,
            end: i * 10 + 10,
            price: Money::from_minor(10_000 - i64::from(i) * 10),
            description: None,
        })
        .collect()
}

fn catalog_with_bom(materials: usize) -> (Catalog, Product) {
    let mut catalog = Catalog::new();
    let mut product = Product::new(NewProduct {
        name: "Cabinet".to_string(),
        ..Default::default()
    })
    .unwrap();
    for i in 0..materials {
        let material = Material::new(NewMaterial {
            name: format!("Material {i}"),
            material_type: "wood".to_string(),
            pack_price: Money::from_minor(5000),
            units_per_pack: 10,
            count_left: 1_000_000,
            ..Default::default()
        })
        .unwrap();
        product
            .add_bom_entry(material.id, (i as u32 % 7) + 1)
            .unwrap();
        catalog.insert_material(material);
    }
    catalog.insert_product(product.clone());
    (catalog, product)
}

fn bench_units_needed(c: &mut Criterion) {
    c.bench_function("domain/material_units_needed", |b| {
        b.iter(|| {
            for quantity in 1..=1000 {
                std::hint::black_box(bom::material_units_needed(7, quantity).unwrap());
            }
        });
    });
}

fn bench_price_lookup(c: &mut Criterion) {
    let tiers = tiers(50);

    c.bench_function("domain/price_for_50_tiers", |b| {
        b.iter(|| {
            for quantity in [1, 250, 499, 10_000] {
                std::hint::black_box(pricing::price_for(&tiers, quantity));
            }
        });
    });
}

fn bench_resolve_bom(c: &mut Criterion) {
    let (catalog, product) = catalog_with_bom(25);

    c.bench_function("domain/resolve_25_materials", |b| {
        b.iter(|| {
            std::hint::black_box(bom::resolve(&product, 120, &catalog).unwrap());
        });
    });
}

fn bench_confirm(c: &mut Criterion) {
    let (catalog, product) = catalog_with_bom(25);
    let order = Order::new(NewOrder::default())
        .set_lines(
            &[LineRequest {
                product_id: product.id,
                quantity: 40,
            }],
            &catalog,
        )
        .unwrap()
        .order;

    c.bench_function("domain/confirm_25_materials", |b| {
        b.iter(|| {
            std::hint::black_box(order.confirm(&catalog).unwrap());
        });
    });
}

fn bench_missing_material(c: &mut Criterion) {
    let (_, mut product) = catalog_with_bom(1);
    product.add_bom_entry(MaterialId::new(), 3).unwrap();
    let empty = Catalog::new();

    c.bench_function("domain/resolve_missing_material", |b| {
        b.iter(|| {
            std::hint::black_box(bom::resolve(&product, 10, &empty).is_err());
        });
    });
}

criterion_group!(
    benches,
    bench_units_needed,
    bench_price_lookup,
    bench_resolve_bom,
    bench_confirm,
    bench_missing_material,
);
criterion_main!(benches);
