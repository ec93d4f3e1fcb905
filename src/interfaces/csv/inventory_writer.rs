use std::io::Write;

use crate::domain::product::Product;
use crate::error::Result;

/// Writes the final inventory state as CSV.
pub struct InventoryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> InventoryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_products(&mut self, products: Vec<Product>) -> Result<()> {
        self.writer
            .write_record(["id", "machine", "motor", "price", "stock"])?;
        for product in products {
            self.writer.write_record([
                product.id.to_string(),
                product.machine_id,
                product.motor_id.to_string(),
                product.price.to_string(),
                product.stock.to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
