//! 电子发票请求体
//!
//! 字段名与开票服务 `third-party-create` 接口保持一致（camelCase）。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    pub solicitud: Solicitud,
    pub cabecera: Cabecera,
    pub detalle: Vec<DetailLine>,
    pub extra_info: Vec<ExtraInfo>,
}

/// 请求元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solicitud {
    pub codigo_modalidad: i32,
    pub codigo_emision: i32,
    pub codigo_documento_sector: i32,
    pub codigo_sucursal: i32,
    pub codigo_ambiente: i32,
    pub codigo_punto_venta: i32,
    pub codigo_actividad: i64,
    pub nit_emisor: String,
    pub codigo_tipo_evento: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leyenda: Option<String>,
    pub fecha_emision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numero_factura: Option<i64>,
    pub formato_pdf: i32,
}

/// 发票抬头
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cabecera {
    pub nit_emisor: u64,
    pub razon_social_emisor: String,
    pub municipio: String,
    pub telefono: String,
    pub numero_factura: i64,
    pub cuf: String,
    pub cufd: String,
    pub codigo_sucursal: i32,
    pub direccion: String,
    pub codigo_punto_venta: i32,
    pub fecha_emision: String,
    pub nombre_razon_social: String,
    pub codigo_tipo_documento_identidad: i32,
    pub numero_documento: String,
    pub complemento: String,
    pub codigo_cliente: String,
    pub codigo_metodo_pago: i32,
    pub numero_tarjeta: i64,
    pub monto_total: f64,
    pub monto_total_sujeto_iva: f64,
    pub codigo_moneda: i32,
    pub tipo_cambio: f64,
    pub monto_total_moneda: f64,
    pub monto_gift_card: f64,
    pub descuento_adicional: f64,
    pub codigo_excepcion: i32,
    pub cafc: String,
    pub leyenda: String,
    pub usuario: String,
    pub codigo_documento_sector: i32,
    pub campos_adicionales: Vec<AdditionalField>,
}

/// 明细行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailLine {
    pub actividad_economica: i64,
    pub codigo_producto_sin: i64,
    pub codigo_producto: String,
    pub descripcion: String,
    pub cantidad: i32,
    pub unidad_medida: i32,
    pub precio_unitario: f64,
    pub monto_descuento: f64,
    pub sub_total: f64,
    pub campos_adicionales: Vec<AdditionalField>,
}

/// 附加字段（clave / valor）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalField {
    pub clave: String,
    pub valor: String,
}

impl AdditionalField {
    pub fn new(clave: impl Into<String>, valor: impl Into<String>) -> Self {
        Self {
            clave: clave.into(),
            valor: valor.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraInfo {
    pub key: String,
    pub value: String,
    pub label: String,
}
