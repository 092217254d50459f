//! 发票请求体生成 - 业务能力层
//!
//! 只负责把一条 [`BillingRecord`] 转成"基本服务"发票（行业代码 13），
//! 不发请求、不写库。

use chrono::{Local, NaiveDateTime};
use phf::phf_map;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::IssuerConfig;
use crate::models::{
    AdditionalField, BillingRecord, Cabecera, DetailLine, InvoiceRequest, Period, Solicitud,
};

/// 基本服务发票的行业代码
const SECTOR_BASIC_SERVICES: i32 = 13;
/// 计量单位：服务
const UNIT_SERVICE: i32 = 58;
const PRODUCT_CODE: &str = "001";
const PRODUCT_DESCRIPTION: &str = "SUBTOTAL SERVICIO DE AGUA";
const NO_ADDRESS: &str = "Sin dirección";

static SPANISH_MONTHS: phf::Map<u32, &'static str> = phf_map! {
    1u32 => "enero",
    2u32 => "febrero",
    3u32 => "marzo",
    4u32 => "abril",
    5u32 => "mayo",
    6u32 => "junio",
    7u32 => "julio",
    8u32 => "agosto",
    9u32 => "septiembre",
    10u32 => "octubre",
    11u32 => "noviembre",
    12u32 => "diciembre",
};

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("调整明细序列化失败: {0}")]
    AdjustmentDetail(#[from] serde_json::Error),
}

/// 发票请求体生成器
pub struct InvoiceFormatter {
    issuer: IssuerConfig,
}

impl InvoiceFormatter {
    pub fn new(issuer: IssuerConfig) -> Self {
        Self { issuer }
    }

    /// 以当前时间作为开票时间生成请求体
    pub fn format(
        &self,
        record: &BillingRecord,
        period: &Period,
    ) -> Result<InvoiceRequest, FormatError> {
        self.format_at(record, period, Local::now().naive_local())
    }

    /// 生成请求体
    ///
    /// # 参数
    /// - `record`: 计费记录
    /// - `period`: 发行期次（决定"月份/年度"附加字段）
    /// - `issued_at`: 开票时间
    pub fn format_at(
        &self,
        record: &BillingRecord,
        period: &Period,
        issued_at: NaiveDateTime,
    ) -> Result<InvoiceRequest, FormatError> {
        let issuer = &self.issuer;
        let charges = &record.charges;
        let fecha_emision = issued_at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
        let nit = customer_document(&record.tax_id, &record.account_id);

        let discount = if charges.legal_discount > 0.0 {
            charges.legal_discount
        } else {
            0.0
        };

        let adjustment_total =
            round2(charges.sewer_surcharge + charges.admin_fee + charges.penalty_surcharge);

        let mut adjustment_detail = BTreeMap::new();
        if charges.sewer_surcharge > 0.0 {
            adjustment_detail.insert("Alcantarillado", format!("{:.6}", charges.sewer_surcharge));
        }
        if charges.admin_fee > 0.0 {
            adjustment_detail.insert("Rep. Formulario", format!("{:.6}", charges.admin_fee));
        }
        if charges.penalty_surcharge > 0.0 {
            adjustment_detail.insert("Recargo", format!("{:.6}", charges.penalty_surcharge));
        }
        let adjustment_detail = serde_json::to_string(&adjustment_detail)?;

        let mut campos_adicionales = vec![
            AdditionalField::new("numeroMedidor", "0"),
            AdditionalField::new("mes", spanish_month(period.month())),
            AdditionalField::new("gestion", period.year().to_string()),
            AdditionalField::new("ciudad", issuer.city.clone()),
            AdditionalField::new("zona", record.zone.clone()),
            AdditionalField::new("domicilioCliente", non_empty_or(&record.address, NO_ADDRESS)),
            AdditionalField::new("consumoPeriodo", format!("{:.2}", record.consumption_m3)),
            AdditionalField::new("ajusteSujetoIva", format!("{:.2}", adjustment_total)),
            AdditionalField::new("detalleAjusteSujetoIva", adjustment_detail),
        ];
        if discount > 0.0 {
            campos_adicionales.push(AdditionalField::new("beneficiarioLey1886", nit.clone()));
        }

        let numero_factura = (record.sequence_number > 0).then_some(record.sequence_number);

        let solicitud = Solicitud {
            codigo_modalidad: 1,
            codigo_emision: 1,
            codigo_documento_sector: SECTOR_BASIC_SERVICES,
            codigo_sucursal: 0,
            codigo_ambiente: 1,
            codigo_punto_venta: 0,
            codigo_actividad: issuer.activity_code,
            nit_emisor: issuer.nit.to_string(),
            codigo_tipo_evento: 0,
            leyenda: None,
            fecha_emision: fecha_emision.clone(),
            numero_factura,
            formato_pdf: 1,
        };

        let cabecera = Cabecera {
            nit_emisor: issuer.nit,
            razon_social_emisor: issuer.business_name.clone(),
            municipio: issuer.municipality.clone(),
            telefono: issuer.phone.clone(),
            numero_factura: numero_factura.unwrap_or(0),
            cuf: String::new(),
            cufd: String::new(),
            codigo_sucursal: 0,
            direccion: issuer.address.clone(),
            codigo_punto_venta: 0,
            fecha_emision,
            nombre_razon_social: record.legal_name.clone(),
            codigo_tipo_documento_identidad: identity_document_type(&nit),
            numero_documento: nit,
            complemento: String::new(),
            codigo_cliente: record.account_id.clone(),
            codigo_metodo_pago: 1,
            numero_tarjeta: 0,
            monto_total: charges.invoiced_total,
            monto_total_sujeto_iva: charges.invoiced_total,
            codigo_moneda: 1,
            tipo_cambio: 1.0,
            monto_total_moneda: charges.invoiced_total,
            monto_gift_card: 0.0,
            descuento_adicional: 0.0,
            codigo_excepcion: 1,
            cafc: String::new(),
            leyenda: issuer.legend.clone(),
            usuario: issuer.user.clone(),
            codigo_documento_sector: SECTOR_BASIC_SERVICES,
            campos_adicionales,
        };

        let detalle = vec![DetailLine {
            actividad_economica: issuer.activity_code,
            codigo_producto_sin: issuer.product_sin_code,
            codigo_producto: PRODUCT_CODE.to_string(),
            descripcion: PRODUCT_DESCRIPTION.to_string(),
            cantidad: 1,
            unidad_medida: UNIT_SERVICE,
            precio_unitario: round2(charges.base_total + discount),
            monto_descuento: discount,
            sub_total: charges.base_total,
            campos_adicionales: Vec::new(),
        }];

        Ok(InvoiceRequest {
            solicitud,
            cabecera,
            detalle,
            extra_info: Vec::new(),
        })
    }
}

/// 证件类型：长度 > 8 为 NIT(5)，> 6 为 CI(1)，其余为其他证件(4)
pub fn identity_document_type(document: &str) -> i32 {
    let len = document.chars().count();
    if len > 8 {
        5
    } else if len > 6 {
        1
    } else {
        4
    }
}

/// 税号为 "0" 或空时使用用户编号
fn customer_document(tax_id: &str, account_id: &str) -> String {
    let tax_id = tax_id.trim();
    if tax_id.is_empty() || tax_id == "0" {
        account_id.to_string()
    } else {
        tax_id.to_string()
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn spanish_month(month: u32) -> String {
    SPANISH_MONTHS.get(&month).copied().unwrap_or_default().to_string()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
