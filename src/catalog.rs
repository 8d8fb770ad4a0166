use std::cmp::Ordering;

use bantuai_backend::database::Product;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProductSortKey {
    #[default]
    Name,
    Sku,
    Brand,
    Category,
    Segment,
    Price,
    Stock,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Case-insensitive substring match on name or SKU. A blank term keeps everything.
pub fn search_products(products: Vec<Product>, term: &str) -> Vec<Product> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return products;
    }
    products
        .into_iter()
        .filter(|product| {
            product.name.to_lowercase().contains(&term) || product.sku.to_lowercase().contains(&term)
        })
        .collect()
}

pub fn sort_products(products: &mut [Product], key: ProductSortKey, direction: SortDirection) {
    products.sort_by(|a, b| {
        let ordering = compare_by(a, b, key);
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare_by(a: &Product, b: &Product, key: ProductSortKey) -> Ordering {
    match key {
        ProductSortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        ProductSortKey::Sku => a.sku.to_lowercase().cmp(&b.sku.to_lowercase()),
        ProductSortKey::Brand => a.brand.to_lowercase().cmp(&b.brand.to_lowercase()),
        ProductSortKey::Category => a.category.as_str().cmp(b.category.as_str()),
        ProductSortKey::Segment => a
            .segment
            .map(|s| s.as_str())
            .cmp(&b.segment.map(|s| s.as_str())),
        ProductSortKey::Price => a.price.cmp(&b.price),
        ProductSortKey::Stock => a.in_stock.cmp(&b.in_stock),
        ProductSortKey::Created => a.created_at.cmp(&b.created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bantuai_backend::database::{ProductCategory, ProductSegment};
    use chrono::Utc;

    fn product(sku: &str, name: &str, brand: &str, price: i64) -> Product {
        Product {
            id: sku.to_lowercase(),
            sku: sku.to_string(),
            name: name.to_string(),
            category: ProductCategory::Smartphone,
            brand: brand.to_string(),
            price,
            segment: Some(ProductSegment::Budget),
            in_stock: true,
            created_at: Utc::now(),
        }
    }

    fn catalogue() -> Vec<Product> {
        vec![
            product("GN-PHN-002", "nusa Phone Lite", "Nusa", 2_499_000),
            product("GN-LPT-001", "Garuda Book 14", "Garuda", 9_999_000),
            product("GN-PHN-001", "Nusa Phone Pro", "nusa", 7_499_000),
        ]
    }

    #[test]
    fn search_matches_name_or_sku_ignoring_case() {
        let by_name = search_products(catalogue(), "PHONE");
        assert_eq!(by_name.len(), 2);
        let by_sku = search_products(catalogue(), "lpt");
        assert_eq!(by_sku.len(), 1);
        assert_eq!(by_sku[0].name, "Garuda Book 14");
        assert_eq!(search_products(catalogue(), "  ").len(), 3);
    }

    #[test]
    fn string_sorts_ignore_case_and_numbers_sort_numerically() {
        let mut products = catalogue();
        sort_products(&mut products, ProductSortKey::Name, SortDirection::Asc);
        let names: Vec<&str> = products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Garuda Book 14", "nusa Phone Lite", "Nusa Phone Pro"]);

        sort_products(&mut products, ProductSortKey::Price, SortDirection::Desc);
        let prices: Vec<i64> = products.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![9_999_000, 7_499_000, 2_499_000]);
    }
}
